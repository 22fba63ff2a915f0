//! Typed, double-buffered properties.
//!
//! Every externally mutable value is a property: the control side validates
//! and enqueues a command plus updates a shadow value for readback, and the
//! audio thread applies the command at the top of the next block, setting a
//! dirty flag. Audio-side code *acquires* a property, reading and clearing
//! that flag, so nothing ever changes mid-block.

use auralis_dsp::BiquadConfig;

use crate::config::{MAX_CHANNELS, SR};
use crate::error::{Error, Result};
use crate::handle::{Handle, ObjectKind};

/// Property identifiers across all object kinds.
///
/// Which properties apply to which kind is enforced by [`validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    /// Object gain multiplier. All kinds with audible output.
    Gain,
    /// Playback position in seconds. Buffer and streaming generators.
    PlaybackPosition,
    /// Playback-rate multiplier. Buffer generators.
    PitchBend,
    /// 0 or 1. Buffer and streaming generators.
    Looping,
    /// The buffer a buffer generator reads. Object-typed.
    Buffer,
    /// Noise algorithm selector. Noise generators.
    NoiseType,
    /// Double3 position. Spatialized sources and the context listener.
    Position,
    /// Double6 (at, up) orientation. Spatialized sources and the listener.
    Orientation,
    /// Pan position in [-1, 1]. Panned sources.
    PanningScalar,
    /// Azimuth in degrees. Panned sources.
    Azimuth,
    /// Distance model selector. Spatialized sources.
    DistanceModel,
    /// Reference distance. Spatialized sources.
    DistanceRef,
    /// Maximum distance. Spatialized sources.
    DistanceMax,
    /// Rolloff factor. Spatialized sources.
    Rolloff,
    /// Per-source biquad filter coefficients.
    Filter,
    /// Reverb decay time in seconds.
    T60,
    /// Reverb in-loop lowpass cutoff in Hz.
    DampingFrequency,
    /// Reverb predelay in seconds.
    Predelay,
}

/// A typed property value, as validated and shadowed on the control side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    F64(f64),
    I64(i64),
    /// `None` clears an object reference.
    Object(Option<Handle>),
    Double3([f64; 3]),
    Double6([f64; 6]),
    Biquad(BiquadConfig),
}

/// An audio-side property slot with a dirty flag.
///
/// The audio thread is single threaded, so the flag is a plain bool; the
/// block-boundary atomicity the engine guarantees comes from the command
/// queue, not from this type.
#[derive(Debug, Clone)]
pub struct PropSlot<T> {
    value: T,
    dirty: bool,
}

impl<T: Clone> PropSlot<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            dirty: false,
        }
    }

    /// Read and clear the dirty flag, returning the value if it changed since
    /// the last acquire.
    pub fn acquire(&mut self) -> Option<T> {
        if self.dirty {
            self.dirty = false;
            Some(self.value.clone())
        } else {
            None
        }
    }

    pub fn get(&self) -> T {
        self.value.clone()
    }

    /// Set from a drained command; marks the slot dirty.
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.dirty = true;
    }

    /// Set without provoking change tracking. Used for positions the engine
    /// reports back to the control side each block.
    pub fn set_untracked(&mut self, value: T) {
        self.value = value;
    }
}

/// Pause state shared by generators, sources and the context.
///
/// Pausing gates gain through the owner's fade driver rather than cutting the
/// signal, so pause and resume are click-free like every other gain change.
#[derive(Debug, Clone, Default)]
pub struct Pausable {
    paused: bool,
    dirty: bool,
}

impl Pausable {
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            self.paused = paused;
            self.dirty = true;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Read and clear the "pause state changed" flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Gain factor to compose with the owner's gain.
    pub fn gain_factor(&self) -> f64 {
        if self.paused {
            0.0
        } else {
            1.0
        }
    }
}

fn expect_f64(value: &PropertyValue) -> Result<f64> {
    match value {
        PropertyValue::F64(v) if v.is_finite() => Ok(*v),
        PropertyValue::F64(_) => Err(Error::Range("value must be finite".to_string())),
        _ => Err(Error::InvalidProperty),
    }
}

fn expect_i64(value: &PropertyValue) -> Result<i64> {
    match value {
        PropertyValue::I64(v) => Ok(*v),
        _ => Err(Error::InvalidProperty),
    }
}

fn expect_finite_slice(values: &[f64]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(Error::Range("vector components must be finite".to_string()))
    }
}

fn range(check: bool, what: &str) -> Result<()> {
    if check {
        Ok(())
    } else {
        Err(Error::Range(what.to_string()))
    }
}

/// Check that `property` applies to `kind` and that `value` has the right type
/// and range. Called on the control side before any command is enqueued, so a
/// failed set mutates nothing.
pub fn validate(kind: ObjectKind, property: Property, value: &PropertyValue) -> Result<()> {
    use ObjectKind as K;
    use Property::*;

    let applicable = matches!(
        (kind, property),
        (K::Context, Gain)
            | (K::Context, Position)
            | (K::Context, Orientation)
            | (K::BufferGenerator, Gain)
            | (K::BufferGenerator, PlaybackPosition)
            | (K::BufferGenerator, PitchBend)
            | (K::BufferGenerator, Looping)
            | (K::BufferGenerator, Buffer)
            | (K::StreamingGenerator, Gain)
            | (K::StreamingGenerator, PlaybackPosition)
            | (K::StreamingGenerator, Looping)
            | (K::NoiseGenerator, Gain)
            | (K::NoiseGenerator, NoiseType)
            | (K::SourceDirect, Gain)
            | (K::SourceDirect, Filter)
            | (K::SourcePanned, Gain)
            | (K::SourcePanned, Filter)
            | (K::SourcePanned, PanningScalar)
            | (K::SourcePanned, Azimuth)
            | (K::Source3D, Gain)
            | (K::Source3D, Filter)
            | (K::Source3D, Position)
            | (K::Source3D, Orientation)
            | (K::Source3D, DistanceModel)
            | (K::Source3D, DistanceRef)
            | (K::Source3D, DistanceMax)
            | (K::Source3D, Rolloff)
            | (K::GlobalEcho, Gain)
            | (K::GlobalFdnReverb, Gain)
            | (K::GlobalFdnReverb, T60)
            | (K::GlobalFdnReverb, DampingFrequency)
            | (K::GlobalFdnReverb, Predelay)
    );
    if !applicable {
        return Err(Error::InvalidProperty);
    }

    match property {
        Gain => {
            let v = expect_f64(value)?;
            range(v >= 0.0, "gain must be >= 0")
        }
        PlaybackPosition => {
            let v = expect_f64(value)?;
            range(v >= 0.0, "position must be >= 0")
        }
        PitchBend => {
            expect_f64(value)?;
            Ok(())
        }
        Looping => {
            let v = expect_i64(value)?;
            range(v == 0 || v == 1, "looping must be 0 or 1")
        }
        Buffer => match value {
            PropertyValue::Object(_) => Ok(()),
            _ => Err(Error::InvalidProperty),
        },
        NoiseType => {
            let v = expect_i64(value)?;
            range(
                auralis_dsp::NoiseType::from_i64(v).is_some(),
                "unknown noise type",
            )
        }
        Position => match value {
            PropertyValue::Double3(v) => expect_finite_slice(v),
            _ => Err(Error::InvalidProperty),
        },
        Orientation => match value {
            PropertyValue::Double6(v) => expect_finite_slice(v),
            _ => Err(Error::InvalidProperty),
        },
        PanningScalar => {
            let v = expect_f64(value)?;
            range((-1.0..=1.0).contains(&v), "panning scalar must be in [-1, 1]")
        }
        Azimuth => {
            expect_f64(value)?;
            Ok(())
        }
        DistanceModel => {
            let v = expect_i64(value)?;
            range(
                auralis_dsp::DistanceModel::from_i64(v).is_some(),
                "unknown distance model",
            )
        }
        DistanceRef => {
            let v = expect_f64(value)?;
            range(v >= 0.0, "reference distance must be >= 0")
        }
        DistanceMax => {
            let v = expect_f64(value)?;
            range(v > 0.0, "max distance must be > 0")
        }
        Rolloff => {
            let v = expect_f64(value)?;
            range(v >= 0.0, "rolloff must be >= 0")
        }
        Filter => match value {
            PropertyValue::Biquad(config) => {
                let finite = [config.b0, config.b1, config.b2, config.a1, config.a2]
                    .iter()
                    .all(|c| c.is_finite());
                range(finite, "filter coefficients must be finite")
            }
            _ => Err(Error::InvalidProperty),
        },
        T60 => {
            let v = expect_f64(value)?;
            range(v > 0.0 && v <= 100.0, "t60 must be in (0, 100]")
        }
        DampingFrequency => {
            let v = expect_f64(value)?;
            range(
                v > 0.0 && v < SR as f64 / 2.0,
                "damping frequency must be below nyquist",
            )
        }
        Predelay => {
            let v = expect_f64(value)?;
            range(
                (0.0..=crate::config::REVERB_MAX_PREDELAY_SECONDS).contains(&v),
                "predelay out of range",
            )
        }
    }
}

/// Control-side shadow defaults for a freshly created object, used for
/// readback before any property has been set.
pub(crate) fn default_shadow(
    kind: ObjectKind,
) -> std::collections::HashMap<Property, PropertyValue> {
    use Property::*;
    use PropertyValue as V;

    let mut shadow = std::collections::HashMap::new();
    let mut put = |property: Property, value: PropertyValue| {
        shadow.insert(property, value);
    };

    match kind {
        ObjectKind::Context => {
            put(Gain, V::F64(1.0));
            put(Position, V::Double3([0.0; 3]));
            put(Orientation, V::Double6([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]));
        }
        ObjectKind::Buffer => {}
        ObjectKind::SourceDirect => {
            put(Gain, V::F64(1.0));
            put(Filter, V::Biquad(BiquadConfig::identity()));
        }
        ObjectKind::SourcePanned => {
            put(Gain, V::F64(1.0));
            put(Filter, V::Biquad(BiquadConfig::identity()));
            put(PanningScalar, V::F64(0.0));
            put(Azimuth, V::F64(0.0));
        }
        ObjectKind::Source3D => {
            put(Gain, V::F64(1.0));
            put(Filter, V::Biquad(BiquadConfig::identity()));
            put(Position, V::Double3([0.0; 3]));
            put(Orientation, V::Double6([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]));
            put(DistanceModel, V::I64(auralis_dsp::DistanceModel::Linear.as_i64()));
            put(DistanceRef, V::F64(1.0));
            put(DistanceMax, V::F64(50.0));
            put(Rolloff, V::F64(1.0));
        }
        ObjectKind::BufferGenerator => {
            put(Gain, V::F64(1.0));
            put(PlaybackPosition, V::F64(0.0));
            put(PitchBend, V::F64(1.0));
            put(Looping, V::I64(0));
            put(Buffer, V::Object(None));
        }
        ObjectKind::StreamingGenerator => {
            put(Gain, V::F64(1.0));
            put(PlaybackPosition, V::F64(0.0));
            put(Looping, V::I64(0));
        }
        ObjectKind::NoiseGenerator => {
            put(Gain, V::F64(1.0));
            put(NoiseType, V::I64(auralis_dsp::NoiseType::White.as_i64()));
        }
        ObjectKind::GlobalEcho => {
            put(Gain, V::F64(1.0));
        }
        ObjectKind::GlobalFdnReverb => {
            put(Gain, V::F64(1.0));
            put(T60, V::F64(1.0));
            put(DampingFrequency, V::F64(6000.0));
            put(Predelay, V::F64(0.01));
        }
    }
    shadow
}

/// Validate a channel count argument.
pub fn validate_channels(channels: usize) -> Result<()> {
    if channels == 0 {
        return Err(Error::Range("channel count must be at least 1".to_string()));
    }
    if channels > MAX_CHANNELS {
        return Err(Error::Range(format!(
            "channel count {channels} exceeds maximum {MAX_CHANNELS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_acquire_clears_dirty() {
        let mut slot = PropSlot::new(1.0f64);
        assert_eq!(slot.acquire(), None);
        slot.set(2.0);
        assert_eq!(slot.acquire(), Some(2.0));
        assert_eq!(slot.acquire(), None);
        assert_eq!(slot.get(), 2.0);
    }

    #[test]
    fn test_slot_untracked_set_does_not_dirty() {
        let mut slot = PropSlot::new(0.0f64);
        slot.set_untracked(5.0);
        assert_eq!(slot.acquire(), None);
        assert_eq!(slot.get(), 5.0);
    }

    #[test]
    fn test_pausable_dirty_only_on_change() {
        let mut p = Pausable::default();
        p.set_paused(false);
        assert!(!p.take_dirty());
        p.set_paused(true);
        assert!(p.take_dirty());
        assert!(!p.take_dirty());
        assert_eq!(p.gain_factor(), 0.0);
    }

    #[test]
    fn test_validate_rejects_wrong_kind() {
        let err = validate(
            ObjectKind::NoiseGenerator,
            Property::PitchBend,
            &PropertyValue::F64(1.0),
        );
        assert!(matches!(err, Err(Error::InvalidProperty)));
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let err = validate(
            ObjectKind::BufferGenerator,
            Property::Gain,
            &PropertyValue::I64(1),
        );
        assert!(matches!(err, Err(Error::InvalidProperty)));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let err = validate(
            ObjectKind::BufferGenerator,
            Property::Gain,
            &PropertyValue::F64(-1.0),
        );
        assert!(matches!(err, Err(Error::Range(_))));

        let err = validate(
            ObjectKind::SourcePanned,
            Property::PanningScalar,
            &PropertyValue::F64(2.0),
        );
        assert!(matches!(err, Err(Error::Range(_))));
    }

    #[test]
    fn test_validate_accepts_good_values() {
        assert!(validate(
            ObjectKind::Source3D,
            Property::Position,
            &PropertyValue::Double3([1.0, 2.0, 3.0]),
        )
        .is_ok());
        assert!(validate(
            ObjectKind::NoiseGenerator,
            Property::NoiseType,
            &PropertyValue::I64(2),
        )
        .is_ok());
    }

    #[test]
    fn test_validate_channels() {
        assert!(validate_channels(0).is_err());
        assert!(validate_channels(1).is_ok());
        assert!(validate_channels(MAX_CHANNELS).is_ok());
        assert!(validate_channels(MAX_CHANNELS + 1).is_err());
    }
}
