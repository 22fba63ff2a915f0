//! Multi-channel noise generator.

use auralis_dsp::{NoiseChannel, NoiseType};

use crate::config::BLOCK_SIZE;
use crate::fade::FadeDriver;
use crate::properties::PropSlot;

/// N decorrelated noise channels sharing one algorithm selector.
///
/// Deterministic: channels are seeded from a base seed at creation, so the
/// same seed and block schedule reproduce the same output bit for bit.
pub(crate) struct NoiseGenerator {
    channels: Vec<NoiseChannel>,
    noise_type: PropSlot<i64>,
}

impl NoiseGenerator {
    pub fn new(channels: usize, seed: u64) -> Self {
        Self {
            channels: (0..channels)
                .map(|ch| NoiseChannel::new(seed.wrapping_add(ch as u64)))
                .collect(),
            noise_type: PropSlot::new(NoiseType::White.as_i64()),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    pub fn set_noise_type(&mut self, noise_type: i64) {
        self.noise_type.set(noise_type);
    }

    pub fn generate_block(&mut self, out: &mut [f32], gain_driver: &FadeDriver, block_time: u64) {
        // A type change applies to all channels atomically at the block top.
        if let Some(raw) = self.noise_type.acquire() {
            if let Some(kind) = NoiseType::from_i64(raw) {
                for channel in &mut self.channels {
                    channel.set_kind(kind);
                }
            }
        }

        let n = self.channels.len();
        gain_driver.drive(block_time, |gain| {
            for i in 0..BLOCK_SIZE {
                let g = gain.at(i);
                for (ch, channel) in self.channels.iter_mut().enumerate() {
                    out[i * n + ch] += g * channel.next_sample();
                }
            }
        });
    }
}
