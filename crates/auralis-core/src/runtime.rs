//! Process-wide engine lifecycle.
//!
//! Exactly one initialization may be live at a time. Initialization starts
//! the deletion thread and the live-objects table; shutdown drains and stops
//! the deletion thread and invalidates every outstanding handle.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::commands::{DeletionQueue, DeletionThread};
use crate::error::{Error, Result};
use crate::handle::HandleRegistry;

pub(crate) struct Runtime {
    pub registry: HandleRegistry,
    deletion: Mutex<DeletionThread>,
    deletion_queue: DeletionQueue,
}

impl Runtime {
    pub fn deletion_queue(&self) -> DeletionQueue {
        self.deletion_queue.clone()
    }
}

static RUNTIME: Mutex<Option<Arc<Runtime>>> = Mutex::new(None);

/// Bring the engine up. Fails with [`Error::AlreadyInitialized`] if a previous
/// initialization is still live.
pub fn initialize() -> Result<()> {
    let mut slot = RUNTIME.lock();
    if slot.is_some() {
        return Err(Error::AlreadyInitialized);
    }
    let deletion = DeletionThread::start();
    let deletion_queue = deletion.queue();
    *slot = Some(Arc::new(Runtime {
        registry: HandleRegistry::new(),
        deletion: Mutex::new(deletion),
        deletion_queue,
    }));
    tracing::info!("engine initialized");
    Ok(())
}

/// Tear the engine down. All handles become invalid; contexts should be
/// dropped first so their audio threads are already gone.
pub fn shutdown() -> Result<()> {
    let runtime = RUNTIME.lock().take().ok_or(Error::NotInitialized)?;
    runtime.registry.clear();
    runtime.deletion.lock().stop();
    tracing::info!("engine shut down");
    Ok(())
}

pub fn is_initialized() -> bool {
    RUNTIME.lock().is_some()
}

/// The live runtime, or [`Error::NotInitialized`].
pub(crate) fn global() -> Result<Arc<Runtime>> {
    RUNTIME.lock().clone().ok_or(Error::NotInitialized)
}
