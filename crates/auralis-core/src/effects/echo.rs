//! Parametric stereo echo.
//!
//! A mono delay line with per-tap `(delay, gain_l, gain_r)` triples. Tap
//! tables are built and validated on the control side; swapping crossfades
//! old against new over one block so reconfiguration never clicks.

use auralis_dsp::DelayLine;

use crate::config::{BLOCK_SIZE, ECHO_MAX_DELAY_SECONDS, SR};
use crate::error::{Error, Result};

/// User-facing tap description, delay in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoTapConfig {
    pub delay: f64,
    pub gain_l: f64,
    pub gain_r: f64,
}

/// Audio-side tap, delay in samples.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EchoTap {
    pub delay: usize,
    pub gain_l: f32,
    pub gain_r: f32,
}

/// Validate and convert a tap table. Runs on the control side so the audio
/// thread only ever swaps ready-made boxes.
pub(crate) fn convert_taps(configs: &[EchoTapConfig]) -> Result<Box<[EchoTap]>> {
    configs
        .iter()
        .map(|config| {
            if !(0.0..=ECHO_MAX_DELAY_SECONDS).contains(&config.delay) {
                return Err(Error::Range(format!(
                    "echo tap delay {} outside [0, {ECHO_MAX_DELAY_SECONDS}]",
                    config.delay
                )));
            }
            if !config.gain_l.is_finite() || !config.gain_r.is_finite() {
                return Err(Error::Range("echo tap gains must be finite".to_string()));
            }
            Ok(EchoTap {
                delay: (config.delay * SR as f64).round() as usize,
                gain_l: config.gain_l as f32,
                gain_r: config.gain_r as f32,
            })
        })
        .collect()
}

pub(crate) struct EchoEffect {
    line: DelayLine,
    taps: Box<[EchoTap]>,
    /// Tap set swapped in by a command, applied with a one-block crossfade.
    pending: Option<Box<[EchoTap]>>,
    /// Displaced tap set awaiting the deletion thread.
    retired: Option<Box<[EchoTap]>>,
}

impl EchoEffect {
    pub fn new() -> Self {
        Self {
            line: DelayLine::new((ECHO_MAX_DELAY_SECONDS * SR as f64) as usize + 1),
            taps: Box::new([]),
            pending: None,
            retired: None,
        }
    }

    /// Stage a new tap set. Returns a displaced pending set, if two swaps land
    /// in one block.
    pub fn set_taps(&mut self, taps: Box<[EchoTap]>) -> Option<Box<[EchoTap]>> {
        self.pending.replace(taps)
    }

    pub fn take_retired(&mut self) -> Option<Box<[EchoTap]>> {
        self.retired.take()
    }

    /// Mono in, stereo out. Adds into `out`.
    pub fn process(&mut self, input: &[f32], out: &mut [f32]) {
        if let Some(new_taps) = self.pending.take() {
            for i in 0..BLOCK_SIZE {
                self.line.write(input[i]);
                let w_new = i as f32 / BLOCK_SIZE as f32;
                let w_old = 1.0 - w_new;
                let mut left = 0.0;
                let mut right = 0.0;
                for tap in self.taps.iter() {
                    let sample = self.line.read(tap.delay);
                    left += w_old * tap.gain_l * sample;
                    right += w_old * tap.gain_r * sample;
                }
                for tap in new_taps.iter() {
                    let sample = self.line.read(tap.delay);
                    left += w_new * tap.gain_l * sample;
                    right += w_new * tap.gain_r * sample;
                }
                out[i * 2] += left;
                out[i * 2 + 1] += right;
            }
            self.retired = Some(std::mem::replace(&mut self.taps, new_taps));
        } else {
            for i in 0..BLOCK_SIZE {
                self.line.write(input[i]);
                let mut left = 0.0;
                let mut right = 0.0;
                for tap in self.taps.iter() {
                    let sample = self.line.read(tap.delay);
                    left += tap.gain_l * sample;
                    right += tap.gain_r * sample;
                }
                out[i * 2] += left;
                out[i * 2 + 1] += right;
            }
        }
    }
}
