//! Byte-stream acquisition.
//!
//! Decoders read bytes through the [`ByteStream`] trait so that audio can come
//! from files, memory, or user-registered transports. Protocols are looked up
//! by name in a process-wide registry; registration happens on control threads
//! only, guarded by a reader/writer lock.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::{DecodeError, Result};

/// Copy granularity for the in-memory stream.
const MEMORY_BLOCK: usize = 4096;

/// A seekable source of bytes.
pub trait ByteStream: Send + Sync {
    /// Read up to `buf.len()` bytes, advancing the cursor. Returns the number
    /// of bytes read; 0 means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn supports_seek(&self) -> bool;

    /// Absolute seek in bytes.
    fn seek(&mut self, position: u64) -> Result<()>;

    fn position(&self) -> u64;

    /// Total size in bytes, when known.
    fn len_bytes(&self) -> Option<u64>;
}

/// A named way of turning `(path, options)` into a [`ByteStream`].
pub trait StreamProtocol: Send + Sync {
    fn open(&self, path: &str, options: &str) -> Result<Box<dyn ByteStream>>;
}

struct Registry {
    protocols: HashMap<String, Arc<dyn StreamProtocol>>,
    memory_buffers: HashMap<String, Arc<[u8]>>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut protocols: HashMap<String, Arc<dyn StreamProtocol>> = HashMap::new();
        protocols.insert("file".to_string(), Arc::new(FileProtocol));
        protocols.insert("memory".to_string(), Arc::new(MemoryProtocol));
        RwLock::new(Registry {
            protocols,
            memory_buffers: HashMap::new(),
        })
    })
}

/// Register a custom protocol. Replaces any previous registration of the same
/// name, including the built-in `file` and `memory` protocols.
pub fn register_protocol(name: &str, protocol: Arc<dyn StreamProtocol>) {
    registry().write().protocols.insert(name.to_string(), protocol);
}

/// Publish a byte buffer under `key` for the built-in `memory` protocol.
pub fn register_memory_buffer(key: &str, data: Vec<u8>) {
    registry()
        .write()
        .memory_buffers
        .insert(key.to_string(), Arc::from(data.into_boxed_slice()));
}

/// Open `path` through the named protocol.
pub fn open_protocol(protocol: &str, path: &str, options: &str) -> Result<Box<dyn ByteStream>> {
    let handler = registry()
        .read()
        .protocols
        .get(protocol)
        .cloned()
        .ok_or_else(|| DecodeError::UnknownProtocol(protocol.to_string()))?;
    handler.open(path, options)
}

struct FileProtocol;

impl StreamProtocol for FileProtocol {
    fn open(&self, path: &str, _options: &str) -> Result<Box<dyn ByteStream>> {
        Ok(Box::new(FileByteStream::open(path)?))
    }
}

struct MemoryProtocol;

impl StreamProtocol for MemoryProtocol {
    fn open(&self, path: &str, _options: &str) -> Result<Box<dyn ByteStream>> {
        let data = registry()
            .read()
            .memory_buffers
            .get(path)
            .cloned()
            .ok_or_else(|| {
                DecodeError::ByteStream(format!("no memory buffer registered as `{path}`"))
            })?;
        Ok(Box::new(MemoryByteStream::new(data)))
    }
}

/// File-backed stream.
pub struct FileByteStream {
    file: File,
    position: u64,
    length: Option<u64>,
}

impl FileByteStream {
    pub fn open(path: &str) -> Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata().ok().map(|m| m.len());
        Ok(Self {
            file,
            position: 0,
            length,
        })
    }
}

impl ByteStream for FileByteStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let got = self.file.read(buf)?;
        self.position += got as u64;
        Ok(got)
    }

    fn supports_seek(&self) -> bool {
        true
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn len_bytes(&self) -> Option<u64> {
        self.length
    }
}

/// Stream over an immutable in-memory buffer.
///
/// Reads are served block-by-block so large requests stay cache-friendly;
/// each pass copies `min(count - got, block_remaining)` bytes and advances the
/// cursor, returning up to `count` bytes total.
pub struct MemoryByteStream {
    data: Arc<[u8]>,
    position: usize,
}

impl MemoryByteStream {
    pub fn new(data: Arc<[u8]>) -> Self {
        Self { data, position: 0 }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::new(Arc::from(data.into_boxed_slice()))
    }
}

impl ByteStream for MemoryByteStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let count = buf.len();
        let mut got = 0;
        while got < count && self.position < self.data.len() {
            let block_remaining = MEMORY_BLOCK - (self.position % MEMORY_BLOCK);
            let available = self.data.len() - self.position;
            let take = (count - got).min(block_remaining).min(available);
            buf[got..got + take].copy_from_slice(&self.data[self.position..self.position + take]);
            self.position += take;
            got += take;
        }
        Ok(got)
    }

    fn supports_seek(&self) -> bool {
        true
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        if position > self.data.len() as u64 {
            return Err(DecodeError::ByteStream(format!(
                "seek to {position} past end of {}-byte buffer",
                self.data.len()
            )));
        }
        self.position = position as usize;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position as u64
    }

    fn len_bytes(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}
