//! Lock-free primitives for the audio and decoder threads.

use atomic_float::AtomicF64;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cache-line aligned atomic f64.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicDouble {
    value: AtomicF64,
}

impl AtomicDouble {
    pub fn new(value: f64) -> Self {
        Self {
            value: AtomicF64::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: f64) -> f64 {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Default for AtomicDouble {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Cache-line aligned atomic bool.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Single-slot request cell for finite f64 values.
///
/// NaN is the empty sentinel, so NaN can never be a legal request. The writer
/// overwrites any pending request; the reader consumes with [`take`].
///
/// [`take`]: SeekCell::take
#[derive(Debug)]
#[repr(align(64))]
pub struct SeekCell {
    value: AtomicF64,
}

impl SeekCell {
    pub fn new() -> Self {
        Self {
            value: AtomicF64::new(f64::NAN),
        }
    }

    /// Post a request. Non-finite values are ignored.
    #[inline]
    pub fn request(&self, value: f64) {
        if value.is_finite() {
            self.value.store(value, Ordering::Release);
        }
    }

    /// Consume the pending request, if any.
    #[inline]
    pub fn take(&self) -> Option<f64> {
        let value = self.value.swap(f64::NAN, Ordering::AcqRel);
        value.is_finite().then_some(value)
    }
}

impl Default for SeekCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_double() {
        let val = AtomicDouble::new(1.0);
        assert_eq!(val.get(), 1.0);
        val.set(2.5);
        assert_eq!(val.get(), 2.5);
        assert_eq!(val.swap(3.0), 2.5);
    }

    #[test]
    fn test_atomic_flag() {
        let flag = AtomicFlag::new(false);
        assert!(!flag.get());
        flag.set(true);
        assert!(flag.get());
    }

    #[test]
    fn test_seek_cell_empty_by_default() {
        let cell = SeekCell::new();
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn test_seek_cell_take_consumes() {
        let cell = SeekCell::new();
        cell.request(5.0);
        assert_eq!(cell.take(), Some(5.0));
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn test_seek_cell_overwrites() {
        let cell = SeekCell::new();
        cell.request(1.0);
        cell.request(2.0);
        assert_eq!(cell.take(), Some(2.0));
    }

    #[test]
    fn test_seek_cell_rejects_nan() {
        let cell = SeekCell::new();
        cell.request(f64::NAN);
        assert_eq!(cell.take(), None);
    }
}
