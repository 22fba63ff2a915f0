//! Opaque handles and the process-wide live-objects table.
//!
//! External callers identify everything by [`Handle`], an opaque u64. The
//! registry maps handles to control-side bookkeeping: the object's kind, its
//! owning context's command sender, the property shadow for readback, and for
//! buffers the decoded data itself. Audio-side object state lives in the
//! context's engine state, keyed by the same handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::buffer::BufferData;
use crate::commands::CommandSender;
use crate::error::{Error, Result};
use crate::lockfree::AtomicDouble;
use crate::properties::{Property, PropertyValue};

/// Opaque identifier for a live engine object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// Allocate a fresh, never-before-used handle.
    pub(crate) fn allocate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Handle(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Object type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Context,
    Buffer,
    SourceDirect,
    SourcePanned,
    Source3D,
    BufferGenerator,
    StreamingGenerator,
    NoiseGenerator,
    GlobalEcho,
    GlobalFdnReverb,
}

impl ObjectKind {
    pub fn is_source(self) -> bool {
        matches!(
            self,
            ObjectKind::SourceDirect | ObjectKind::SourcePanned | ObjectKind::Source3D
        )
    }

    pub fn is_generator(self) -> bool {
        matches!(
            self,
            ObjectKind::BufferGenerator
                | ObjectKind::StreamingGenerator
                | ObjectKind::NoiseGenerator
        )
    }

    pub fn is_effect(self) -> bool {
        matches!(self, ObjectKind::GlobalEcho | ObjectKind::GlobalFdnReverb)
    }
}

/// Control-side record for one live object.
pub(crate) struct ObjectEntry {
    pub kind: ObjectKind,
    /// Owning context, `None` for contexts and buffers.
    pub context: Option<Handle>,
    /// Command route into the owning context's audio thread.
    pub commands: Option<CommandSender>,
    /// Control-side shadow of property values for readback consistency.
    pub shadow: Mutex<HashMap<Property, PropertyValue>>,
    /// Observable playback position, written by the audio or decoder thread.
    pub position_report: Option<Arc<AtomicDouble>>,
    /// Decoded sample data, for `ObjectKind::Buffer` entries.
    pub buffer: Option<Arc<BufferData>>,
}

/// The live-objects table.
pub(crate) struct HandleRegistry {
    entries: DashMap<Handle, Arc<ObjectEntry>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, handle: Handle, entry: ObjectEntry) {
        self.entries.insert(handle, Arc::new(entry));
    }

    pub fn get(&self, handle: Handle) -> Result<Arc<ObjectEntry>> {
        self.entries
            .get(&handle)
            .map(|entry| entry.value().clone())
            .ok_or(Error::InvalidHandle)
    }

    /// Like [`get`](Self::get), also checking the object kind.
    pub fn get_kind(&self, handle: Handle, want: impl Fn(ObjectKind) -> bool) -> Result<Arc<ObjectEntry>> {
        let entry = self.get(handle)?;
        if want(entry.kind) {
            Ok(entry)
        } else {
            Err(Error::InvalidHandle)
        }
    }

    pub fn remove(&self, handle: Handle) -> Option<Arc<ObjectEntry>> {
        self.entries.remove(&handle).map(|(_, entry)| entry)
    }

    /// Invalidate every handle. Used at shutdown and on fatal device loss.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove all objects belonging to `context` (and the context itself).
    pub fn remove_context_objects(&self, context: Handle) {
        self.entries
            .retain(|handle, entry| *handle != context && entry.context != Some(context));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_entry(kind: ObjectKind) -> ObjectEntry {
        ObjectEntry {
            kind,
            context: None,
            commands: None,
            shadow: Mutex::new(HashMap::new()),
            position_report: None,
            buffer: None,
        }
    }

    #[test]
    fn test_handles_are_unique() {
        let a = Handle::allocate();
        let b = Handle::allocate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_registry_roundtrip() {
        let registry = HandleRegistry::new();
        let handle = Handle::allocate();
        registry.insert(handle, plain_entry(ObjectKind::Buffer));
        assert_eq!(registry.get(handle).unwrap().kind, ObjectKind::Buffer);
        registry.remove(handle);
        assert!(matches!(registry.get(handle), Err(Error::InvalidHandle)));
    }

    #[test]
    fn test_get_kind_checks_kind() {
        let registry = HandleRegistry::new();
        let handle = Handle::allocate();
        registry.insert(handle, plain_entry(ObjectKind::NoiseGenerator));
        assert!(registry.get_kind(handle, ObjectKind::is_generator).is_ok());
        assert!(registry.get_kind(handle, ObjectKind::is_source).is_err());
    }

    #[test]
    fn test_remove_context_objects() {
        let registry = HandleRegistry::new();
        let ctx = Handle::allocate();
        registry.insert(ctx, plain_entry(ObjectKind::Context));

        let child = Handle::allocate();
        let mut entry = plain_entry(ObjectKind::SourceDirect);
        entry.context = Some(ctx);
        registry.insert(child, entry);

        let unrelated = Handle::allocate();
        registry.insert(unrelated, plain_entry(ObjectKind::Buffer));

        registry.remove_context_objects(ctx);
        assert!(registry.get(ctx).is_err());
        assert!(registry.get(child).is_err());
        assert!(registry.get(unrelated).is_ok());
    }
}
