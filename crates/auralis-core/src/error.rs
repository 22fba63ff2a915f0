//! Error types for auralis-core.

use thiserror::Error;

/// Error type for engine operations.
///
/// Control-API calls that fail return one of these and leave engine state
/// untouched. Errors on the audio thread are never surfaced here; they degrade
/// to silence and are logged.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Value out of range: {0}")]
    Range(String),

    #[error("Handle does not reference a live object of the expected kind")]
    InvalidHandle,

    #[error("Property is not valid for this object")]
    InvalidProperty,

    #[error("Byte stream: {0}")]
    ByteStream(String),

    #[error("Byte stream operation not supported: {0}")]
    ByteStreamUnsupportedOperation(String),

    #[error("Decoding failed: {0}")]
    Decoding(String),

    #[error("Engine is already initialized")]
    AlreadyInitialized,

    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("Context is not headless")]
    NotHeadless,

    #[error("No audio output device available")]
    NoDevice,

    #[error("Audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<auralis_decode::DecodeError> for Error {
    fn from(err: auralis_decode::DecodeError) -> Self {
        use auralis_decode::DecodeError;
        match err {
            DecodeError::ByteStream(msg) => Error::ByteStream(msg),
            DecodeError::ByteStreamUnsupportedOperation(op) => {
                Error::ByteStreamUnsupportedOperation(op.to_string())
            }
            DecodeError::UnknownProtocol(p) => Error::ByteStream(format!("unknown protocol: {p}")),
            DecodeError::Decoding(msg) => Error::Decoding(msg),
            DecodeError::Io(e) => Error::ByteStream(e.to_string()),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
