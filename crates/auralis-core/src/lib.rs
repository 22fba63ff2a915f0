//! Core of the auralis realtime audio engine.
//!
//! Auralis produces a continuous mixed stream by combining independent
//! sources (direct, panned, spatialized), each fed by generators (buffer,
//! streaming, noise), with global effects (echo, FDN reverb) reached through
//! a declarative fade-aware router. The audio path is block-synchronous and
//! never allocates, locks or blocks; control threads reach it only through a
//! bounded command queue drained at block boundaries.
//!
//! # Primary API
//!
//! - [`initialize`] / [`shutdown`]: process-wide lifecycle
//! - [`Context`]: device (or headless) instance and object factory
//! - [`api`]: handle-keyed property setters/getters, buffers, `handle_free`
//! - [`Property`]: the property namespace shared by all object kinds

// Error types
pub mod error;
pub use error::{Error, Result};

// Compile-time configuration
pub mod config;

// Process lifecycle
mod runtime;
pub use runtime::{initialize, is_initialized, shutdown};

// Handles and the live-objects table
mod handle;
pub use handle::{Handle, ObjectKind};

// Properties
mod properties;
pub use properties::Property;

// Fades
mod fade;
pub use fade::{BlockGain, FadeDriver, LinearFader};

// Lock-free primitives
mod lockfree;
pub use lockfree::{AtomicDouble, AtomicFlag, SeekCell};

// Command plumbing and the deletion thread
mod commands;

// Buffers
mod buffer;
pub use buffer::{BufferData, BufferReader};

// Router
mod router;
pub use router::{InputKey, OutputKey, RouteState, Router};

// Generators
mod generator;
mod generators;

// Sources
mod sources;

// Effects
mod effects;
pub use effects::echo::EchoTapConfig;

// Context and the audio-side scheduler
mod context;
pub use context::{Context, RouteConfig};

// Device output
mod output;

// Handle-keyed control API
pub mod api;
