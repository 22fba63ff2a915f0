//! # Auralis - Realtime Audio Synthesis & Spatialization
//!
//! Auralis mixes independent *sources* (direct, panned, or positioned in 3D
//! space), each fed by *generators* (in-memory buffers, streamed decoded
//! audio, procedural noise), into a block-synchronous stereo master. Global
//! *effects* (echo, FDN reverb) hang off a declarative router whose every
//! gain transition is fade-aware, so nothing ever clicks.
//!
//! ## Architecture
//!
//! Auralis is an umbrella crate over:
//! - **auralis-core** - Block scheduler, command queue, property system,
//!   router, generators, sources, effects, device output
//! - **auralis-dsp** - DSP kernels (noise, panning, distance models, filters,
//!   delay lines)
//! - **auralis-decode** - Decoder trait, byte-stream protocols, Symphonia
//!   backend
//!
//! ## Quick Start
//!
//! ```no_run
//! use auralis::prelude::*;
//!
//! # fn main() -> auralis::Result<()> {
//! let engine = Engine::new()?;
//! let context = engine.create_context()?;
//!
//! let source = context.create_source_direct()?;
//! let generator = context.create_buffer_generator()?;
//! let buffer = api::create_buffer_from_stream("file", "clip.ogg", "")?;
//! api::set_object(generator, Property::Buffer, Some(buffer))?;
//! context.source_add_generator(source, generator)?;
//!
//! // Fade the source down; applied click-free at the next block boundary.
//! api::set_f64(source, Property::Gain, 0.5)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Threads
//!
//! The audio thread never allocates, locks or blocks. Control threads post
//! commands through a bounded queue applied at block boundaries; streaming
//! generators each own a decoder thread; a deletion thread runs destructors
//! so frees never happen on the audio path.

mod engine;
pub use engine::Engine;

mod logging;
pub use logging::{configure_logging, set_log_level, LogLevel};

/// Re-export of auralis-core for direct access.
pub use auralis_core as core;

pub use auralis_core::{
    api, config, initialize, is_initialized, shutdown, BufferData, Context, EchoTapConfig,
    Error, Handle, ObjectKind, Property, Result, RouteConfig,
};

pub use auralis_dsp::{BiquadConfig, DistanceModel, NoiseType};

pub use auralis_decode::{
    register_protocol, AudioDecoder, ByteStream, RawDecoder, StreamProtocol,
};

pub mod prelude {
    //! Everything a typical embedding needs.
    pub use crate::api;
    pub use crate::{
        configure_logging, BiquadConfig, Context, DistanceModel, EchoTapConfig, Engine, Handle,
        LogLevel, NoiseType, Property, RouteConfig,
    };
}
