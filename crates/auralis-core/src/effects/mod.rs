//! Global effects: router-fed processors on the master bus.
//!
//! A global effect owns one router input handle. Per block it reads whatever
//! the routes accumulated there, produces a stereo block, and adds it to the
//! master through its own gain fade.

pub(crate) mod echo;
pub(crate) mod reverb;

use crate::commands::{CommandValue, Garbage};
use crate::config::{BLOCK_SIZE, MASTER_CHANNELS};
use crate::fade::FadeDriver;
use crate::handle::Handle;
use crate::properties::{PropSlot, Property};
use crate::router::{InputKey, Router};

use echo::{EchoEffect, EchoTap};
use reverb::FdnReverbEffect;

pub(crate) enum EffectKind {
    Echo(EchoEffect),
    FdnReverb(FdnReverbEffect),
}

/// Audio-side state for one global effect.
pub(crate) struct EffectObject {
    pub handle: Handle,
    pub external_alive: bool,
    pub kind: EffectKind,
    pub input_key: InputKey,
    gain: PropSlot<f64>,
    gain_driver: FadeDriver,
    wet: Vec<f32>,
}

impl EffectObject {
    pub fn new(handle: Handle, kind: EffectKind) -> Self {
        Self {
            handle,
            external_alive: true,
            kind,
            input_key: InputKey::UNREGISTERED,
            gain: PropSlot::new(1.0),
            gain_driver: FadeDriver::new(1.0, 1),
            wet: vec![0.0; BLOCK_SIZE * MASTER_CHANNELS],
        }
    }

    /// Channel count of this effect's router input accumulator.
    pub fn input_channels(&self) -> usize {
        1
    }

    pub fn run(&mut self, router: &Router, master: &mut [f32], block_time: u64) {
        let Some(input) = router.input_buffer(self.input_key) else {
            return;
        };

        self.wet.fill(0.0);
        match &mut self.kind {
            EffectKind::Echo(effect) => effect.process(input, &mut self.wet),
            EffectKind::FdnReverb(effect) => effect.process(input, &mut self.wet),
        }

        if let Some(gain) = self.gain.acquire() {
            self.gain_driver.set_value(block_time, gain as f32);
        }
        self.gain_driver.drive(block_time, |gain| {
            for i in 0..BLOCK_SIZE {
                let g = gain.at(i);
                master[i * 2] += g * self.wet[i * 2];
                master[i * 2 + 1] += g * self.wet[i * 2 + 1];
            }
        });
    }

    pub fn apply_property(&mut self, property: Property, value: CommandValue) -> Option<Garbage> {
        match (&mut self.kind, property, value) {
            (_, Property::Gain, CommandValue::F64(v)) => self.gain.set(v),
            (EffectKind::FdnReverb(reverb), Property::T60, CommandValue::F64(v)) => {
                reverb.set_t60(v)
            }
            (EffectKind::FdnReverb(reverb), Property::DampingFrequency, CommandValue::F64(v)) => {
                reverb.set_damping_frequency(v)
            }
            (EffectKind::FdnReverb(reverb), Property::Predelay, CommandValue::F64(v)) => {
                reverb.set_predelay(v)
            }
            (_, property, _) => {
                tracing::debug!(?property, "ignoring property not applicable to effect");
            }
        }
        None
    }

    /// Install a new tap set (echo only). Returns any displaced set for the
    /// deletion thread.
    pub fn set_taps(&mut self, taps: Box<[EchoTap]>) -> Option<Garbage> {
        match &mut self.kind {
            EffectKind::Echo(effect) => effect
                .set_taps(taps)
                .map(|old| Box::new(old) as Garbage),
            EffectKind::FdnReverb(_) => None,
        }
    }

    /// Tap sets replaced during the last block, to be dropped off-thread.
    pub fn take_retired(&mut self) -> Option<Garbage> {
        match &mut self.kind {
            EffectKind::Echo(effect) => effect.take_retired().map(|old| Box::new(old) as Garbage),
            EffectKind::FdnReverb(_) => None,
        }
    }
}
