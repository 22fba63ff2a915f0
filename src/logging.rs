//! Logging configuration.
//!
//! The engine emits `tracing` events; where they go is the host's business.
//! These helpers install a plain fmt subscriber for hosts that don't bring
//! their own, with a runtime-adjustable level.

use std::sync::OnceLock;

use auralis_core::{Error, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

static RELOAD_HANDLE: OnceLock<reload::Handle<LevelFilter, Registry>> = OnceLock::new();

/// Install the engine's fmt subscriber at `level`.
///
/// Fails if a global subscriber (this one or the host's own) is already
/// installed; in that case the host's subscriber receives the engine's
/// events and this function is unnecessary.
pub fn configure_logging(level: LogLevel) -> Result<()> {
    let (filter, handle) = reload::Layer::new(LevelFilter::from(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::Internal(format!("logging already configured: {e}")))?;
    let _ = RELOAD_HANDLE.set(handle);
    Ok(())
}

/// Adjust the level of a subscriber installed by [`configure_logging`].
pub fn set_log_level(level: LogLevel) -> Result<()> {
    let handle = RELOAD_HANDLE
        .get()
        .ok_or_else(|| Error::Internal("configure_logging was never called".to_string()))?;
    handle
        .reload(LevelFilter::from(level))
        .map_err(|e| Error::Internal(format!("failed to update log level: {e}")))
}
