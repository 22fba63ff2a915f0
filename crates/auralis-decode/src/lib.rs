//! Decoding boundary for the auralis engine.
//!
//! The engine core consumes audio through the [`AudioDecoder`] trait and
//! acquires bytes through pluggable [`stream`] protocols. This crate provides
//! both plus two decoder implementations: a Symphonia-backed decoder for real
//! container formats (WAV, FLAC, Ogg/Vorbis, MP3) and a raw in-memory PCM
//! decoder used by tests and the `memory` protocol.

pub mod raw;
pub mod stream;

mod symphonia_decoder;

pub use raw::RawDecoder;
pub use stream::{
    register_memory_buffer, register_protocol, ByteStream, MemoryByteStream, StreamProtocol,
};
pub use symphonia_decoder::SymphoniaDecoder;

use thiserror::Error;

/// Errors raised by the decoding layer.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Byte stream: {0}")]
    ByteStream(String),

    #[error("Byte stream operation not supported: {0}")]
    ByteStreamUnsupportedOperation(&'static str),

    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("Decoding failed: {0}")]
    Decoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// A source of interleaved f32 PCM.
///
/// Decoders are pull-driven and stateful: `write_samples_interleaved` advances
/// an internal cursor and returns how many frames it produced, returning 0 at
/// end of stream. They deliberately do not track playback position; callers
/// bookkeep from the returned frame counts.
pub trait AudioDecoder: Send {
    /// Native sample rate of the underlying stream.
    fn sample_rate(&self) -> u32;

    /// Channel count of the underlying stream.
    fn channels(&self) -> usize;

    /// Decode up to `frames` frames into `out` (interleaved, at least
    /// `frames * channels` long). Returns the number of frames written; 0
    /// means end of stream.
    fn write_samples_interleaved(&mut self, frames: usize, out: &mut [f32]) -> Result<usize>;

    fn supports_seek(&self) -> bool;

    fn seek_seconds(&mut self, position: f64) -> Result<()>;

    /// Total duration if the container knows it.
    fn duration_seconds(&self) -> Option<f64>;
}

/// Open a decoder for `protocol:path`, resolving the protocol through the
/// byte-stream registry and probing the bytes with Symphonia.
pub fn decoder_for_protocol(
    protocol: &str,
    path: &str,
    options: &str,
) -> Result<Box<dyn AudioDecoder>> {
    let byte_stream = stream::open_protocol(protocol, path, options)?;
    let decoder = SymphoniaDecoder::from_stream(byte_stream, path)?;
    Ok(Box::new(decoder))
}
