//! RAII wrapper around the process-wide engine lifecycle.

use auralis_core::{Context, Result};

/// Owns the engine's global initialization.
///
/// Creating an [`Engine`] brings up the deletion thread and the live-objects
/// table; dropping it shuts the engine down and invalidates all handles.
/// Contexts created through it should be dropped before the engine.
///
/// Code that wants explicit control can call [`auralis_core::initialize`] and
/// [`auralis_core::shutdown`] directly instead.
pub struct Engine {
    _private: (),
}

impl Engine {
    /// Initialize the engine. Fails if another initialization is live.
    pub fn new() -> Result<Self> {
        auralis_core::initialize()?;
        Ok(Self { _private: () })
    }

    /// Create a context driving the default audio device.
    pub fn create_context(&self) -> Result<Context> {
        Context::new()
    }

    /// Create a context without a device, rendered by
    /// [`Context::render_block`].
    pub fn create_headless_context(&self) -> Result<Context> {
        Context::new_headless()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = auralis_core::shutdown() {
            tracing::warn!("engine shutdown failed: {e}");
        }
    }
}
