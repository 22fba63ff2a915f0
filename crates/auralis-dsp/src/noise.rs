//! Per-channel noise algorithms.
//!
//! Three flavors are supported: uniform white noise, Voss-McCartney pink-ish
//! noise, and brown noise produced by lowpass-filtering white noise. Each
//! channel of a noise generator owns an independent [`NoiseChannel`] so that
//! multi-channel noise is decorrelated.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Number of update rows for the Voss-McCartney algorithm.
const VM_ROWS: usize = 12;

/// Normalization for the VM row sum (rows + the always-updated row).
const VM_SCALE: f32 = 1.0 / (VM_ROWS as f32 + 1.0);

/// Leaky-integrator coefficient for brown noise, tuned by ear against the
/// usual -6 dB/octave slope at 44.1 kHz.
const BROWN_LEAK: f32 = 0.995;

/// Compensation so brown output stays roughly within [-1, 1].
const BROWN_SCALE: f32 = 0.06;

/// Selectable noise algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoiseType {
    #[default]
    White,
    /// Voss-McCartney: layered sample-and-hold rows, approximately pink.
    Vm,
    /// White noise through a leaky integrator, approximately brown.
    FilteredBrown,
}

impl NoiseType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(NoiseType::White),
            1 => Some(NoiseType::Vm),
            2 => Some(NoiseType::FilteredBrown),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            NoiseType::White => 0,
            NoiseType::Vm => 1,
            NoiseType::FilteredBrown => 2,
        }
    }
}

/// One channel's worth of noise state.
///
/// Deterministic for a given seed: the same seed and call sequence always
/// produces the same samples.
#[derive(Debug, Clone)]
pub struct NoiseChannel {
    kind: NoiseType,
    rng: SmallRng,
    /// Voss-McCartney sample-and-hold rows plus their running sum.
    vm_rows: [f32; VM_ROWS],
    vm_sum: f32,
    vm_counter: u32,
    brown_state: f32,
}

impl NoiseChannel {
    pub fn new(seed: u64) -> Self {
        Self {
            kind: NoiseType::White,
            rng: SmallRng::seed_from_u64(seed),
            vm_rows: [0.0; VM_ROWS],
            vm_sum: 0.0,
            vm_counter: 0,
            brown_state: 0.0,
        }
    }

    pub fn kind(&self) -> NoiseType {
        self.kind
    }

    /// Switch algorithms. Filter/row state is reset; the RNG stream continues,
    /// keeping the channel deterministic across reconfiguration.
    pub fn set_kind(&mut self, kind: NoiseType) {
        if kind == self.kind {
            return;
        }
        self.kind = kind;
        self.vm_rows = [0.0; VM_ROWS];
        self.vm_sum = 0.0;
        self.vm_counter = 0;
        self.brown_state = 0.0;
    }

    #[inline]
    fn white(&mut self) -> f32 {
        self.rng.random_range(-1.0f32..1.0f32)
    }

    #[inline]
    fn vm(&mut self) -> f32 {
        // Classic Voss-McCartney: each tick refreshes the row selected by the
        // trailing-zero count of the counter, so row k updates every 2^k
        // ticks. An extra unconditional white sample fills in the top octave.
        self.vm_counter = self.vm_counter.wrapping_add(1);
        let row = (self.vm_counter.trailing_zeros() as usize).min(VM_ROWS - 1);
        let fresh = self.white();
        self.vm_sum += fresh - self.vm_rows[row];
        self.vm_rows[row] = fresh;
        (self.vm_sum + self.white()) * VM_SCALE
    }

    #[inline]
    fn filtered_brown(&mut self) -> f32 {
        let w = self.white();
        self.brown_state = BROWN_LEAK * self.brown_state + w;
        self.brown_state * BROWN_SCALE
    }

    /// Produce the next sample.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        match self.kind {
            NoiseType::White => self.white(),
            NoiseType::Vm => self.vm(),
            NoiseType::FilteredBrown => self.filtered_brown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_in_range() {
        let mut ch = NoiseChannel::new(1);
        for _ in 0..10_000 {
            let s = ch.next_sample();
            assert!((-1.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let mut a = NoiseChannel::new(42);
        let mut b = NoiseChannel::new(42);
        for _ in 0..1_000 {
            assert_eq!(a.next_sample(), b.next_sample());
        }
    }

    #[test]
    fn test_seeds_decorrelate() {
        let mut a = NoiseChannel::new(1);
        let mut b = NoiseChannel::new(2);
        let identical = (0..64).all(|_| a.next_sample() == b.next_sample());
        assert!(!identical);
    }

    #[test]
    fn test_vm_bounded() {
        let mut ch = NoiseChannel::new(7);
        ch.set_kind(NoiseType::Vm);
        for _ in 0..50_000 {
            let s = ch.next_sample();
            assert!(s.abs() <= 1.5, "VM sample escaped: {s}");
        }
    }

    #[test]
    fn test_brown_bounded() {
        let mut ch = NoiseChannel::new(9);
        ch.set_kind(NoiseType::FilteredBrown);
        for _ in 0..100_000 {
            let s = ch.next_sample();
            assert!(s.abs() <= 1.5, "brown sample escaped: {s}");
        }
    }

    #[test]
    fn test_set_kind_resets_state() {
        let mut ch = NoiseChannel::new(3);
        ch.set_kind(NoiseType::FilteredBrown);
        for _ in 0..1000 {
            ch.next_sample();
        }
        ch.set_kind(NoiseType::White);
        ch.set_kind(NoiseType::FilteredBrown);
        assert_eq!(ch.brown_state, 0.0);
    }

    #[test]
    fn test_noise_type_roundtrip() {
        for kind in [NoiseType::White, NoiseType::Vm, NoiseType::FilteredBrown] {
            assert_eq!(NoiseType::from_i64(kind.as_i64()), Some(kind));
        }
        assert_eq!(NoiseType::from_i64(3), None);
    }
}
