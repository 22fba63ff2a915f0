//! Concrete generator implementations.

pub(crate) mod buffer;
pub(crate) mod noise;
pub(crate) mod streaming;
