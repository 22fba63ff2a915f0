//! Generators: block producers attached to sources.
//!
//! A generator outputs one block of up to [`MAX_CHANNELS`] channels, *adding*
//! into the output it is given. Gain and pause changes are composed into a
//! shared fade driver here, so concrete generators only implement
//! `generate_block` and respect the driver they are handed.
//!
//! [`MAX_CHANNELS`]: crate::config::MAX_CHANNELS

use crate::commands::{CommandValue, Garbage};
use crate::fade::FadeDriver;
use crate::generators::buffer::BufferGenerator;
use crate::generators::noise::NoiseGenerator;
use crate::generators::streaming::StreamingGenerator;
use crate::handle::Handle;
use crate::properties::{Pausable, PropSlot, Property};

pub(crate) enum GeneratorKind {
    Buffer(BufferGenerator),
    Streaming(StreamingGenerator),
    Noise(NoiseGenerator),
}

/// Audio-side state for one generator.
pub(crate) struct GeneratorObject {
    pub handle: Handle,
    /// False once the external handle is freed.
    pub external_alive: bool,
    /// Number of sources currently holding this generator.
    pub ref_count: u32,
    gain: PropSlot<f64>,
    gain_driver: FadeDriver,
    pause: Pausable,
    pub kind: GeneratorKind,
}

impl GeneratorObject {
    pub fn new(handle: Handle, kind: GeneratorKind) -> Self {
        Self {
            handle,
            external_alive: true,
            ref_count: 0,
            gain: PropSlot::new(1.0),
            gain_driver: FadeDriver::new(1.0, 1),
            pause: Pausable::default(),
            kind,
        }
    }

    /// Channel count for the next block. Re-read by the host every block.
    pub fn channels(&self) -> usize {
        match &self.kind {
            GeneratorKind::Buffer(gen) => gen.channels(),
            GeneratorKind::Streaming(gen) => gen.channels(),
            GeneratorKind::Noise(gen) => gen.channels(),
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.pause.set_paused(paused);
    }

    /// Render one block additively into `out` (length `BLOCK_SIZE * channels()`).
    ///
    /// Paused generators keep running so their clocks advance; the pause just
    /// drives their gain to zero through the fade.
    pub fn run(&mut self, out: &mut [f32], block_time: u64) {
        let gain_changed = self.gain.acquire().is_some();
        let pause_changed = self.pause.take_dirty();
        if gain_changed || pause_changed {
            let gain = self.gain.get() * self.pause.gain_factor();
            self.gain_driver.set_value(block_time, gain as f32);
        }

        match &mut self.kind {
            GeneratorKind::Buffer(gen) => gen.generate_block(out, &self.gain_driver, block_time),
            GeneratorKind::Streaming(gen) => gen.generate_block(out, &self.gain_driver, block_time),
            GeneratorKind::Noise(gen) => gen.generate_block(out, &self.gain_driver, block_time),
        }
    }

    /// Apply a drained property command. Returns anything whose drop must be
    /// deferred to the deletion thread.
    pub fn apply_property(&mut self, property: Property, value: CommandValue) -> Option<Garbage> {
        match (property, value) {
            (Property::Gain, CommandValue::F64(v)) => {
                self.gain.set(v);
                None
            }
            (Property::PlaybackPosition, CommandValue::F64(v)) => {
                match &mut self.kind {
                    GeneratorKind::Buffer(gen) => gen.set_position(v),
                    GeneratorKind::Streaming(gen) => gen.set_position(v),
                    GeneratorKind::Noise(_) => {}
                }
                None
            }
            (Property::PitchBend, CommandValue::F64(v)) => {
                if let GeneratorKind::Buffer(gen) = &mut self.kind {
                    gen.set_pitch_bend(v);
                }
                None
            }
            (Property::Looping, CommandValue::I64(v)) => {
                match &mut self.kind {
                    GeneratorKind::Buffer(gen) => gen.set_looping(v),
                    GeneratorKind::Streaming(gen) => gen.set_looping(v),
                    GeneratorKind::Noise(_) => {}
                }
                None
            }
            (Property::Buffer, CommandValue::Buffer(buffer)) => {
                if let GeneratorKind::Buffer(gen) = &mut self.kind {
                    let old = gen.set_buffer(buffer);
                    old.map(|arc| Box::new(arc) as Garbage)
                } else {
                    None
                }
            }
            (Property::NoiseType, CommandValue::I64(v)) => {
                if let GeneratorKind::Noise(gen) = &mut self.kind {
                    gen.set_noise_type(v);
                }
                None
            }
            _ => {
                tracing::debug!(?property, "ignoring property not applicable to generator");
                None
            }
        }
    }
}
