//! Feedback-delay-network reverb.
//!
//! Eight mutually prime delay lines with a Householder feedback matrix and a
//! one-pole lowpass in the loop. Per-line decay gains are derived from the
//! T60 property; damping shapes the high-frequency decay; a predelay line
//! sits on the input.

use auralis_dsp::{DelayLine, OnePoleLowpass};

use crate::config::{BLOCK_SIZE, REVERB_MAX_PREDELAY_SECONDS, SR};
use crate::properties::PropSlot;

const LINES: usize = 8;

/// Delay lengths in samples, mutually prime for a dense late field.
const LINE_DELAYS: [usize; LINES] = [1031, 1327, 1523, 1801, 2053, 2311, 2617, 2903];

/// Input injection gain per line.
const INPUT_GAIN: f32 = 0.25;

/// Output tap scaling.
const OUTPUT_GAIN: f32 = 0.25;

pub(crate) struct FdnReverbEffect {
    lines: Vec<DelayLine>,
    lowpass: Vec<OnePoleLowpass>,
    gains: [f32; LINES],
    predelay_line: DelayLine,
    predelay_samples: usize,
    t60: PropSlot<f64>,
    damping_frequency: PropSlot<f64>,
    predelay: PropSlot<f64>,
    line_out: [f32; LINES],
}

impl FdnReverbEffect {
    pub fn new() -> Self {
        let mut reverb = Self {
            lines: LINE_DELAYS.iter().map(|&d| DelayLine::new(d + 1)).collect(),
            lowpass: (0..LINES)
                .map(|_| OnePoleLowpass::new(SR as f64, 6000.0))
                .collect(),
            gains: [0.0; LINES],
            predelay_line: DelayLine::new(
                (REVERB_MAX_PREDELAY_SECONDS * SR as f64) as usize + 1,
            ),
            predelay_samples: (0.01 * SR as f64) as usize,
            t60: PropSlot::new(1.0),
            damping_frequency: PropSlot::new(6000.0),
            predelay: PropSlot::new(0.01),
            line_out: [0.0; LINES],
        };
        reverb.recompute_gains(1.0);
        reverb
    }

    pub fn set_t60(&mut self, t60: f64) {
        self.t60.set(t60);
    }

    pub fn set_damping_frequency(&mut self, frequency: f64) {
        self.damping_frequency.set(frequency);
    }

    pub fn set_predelay(&mut self, seconds: f64) {
        self.predelay.set(seconds);
    }

    /// `g = 10^(-3 * delay_seconds / t60)` per line: -60 dB after t60 seconds
    /// of recirculation.
    fn recompute_gains(&mut self, t60: f64) {
        for (gain, &delay) in self.gains.iter_mut().zip(LINE_DELAYS.iter()) {
            let delay_seconds = delay as f64 / SR as f64;
            *gain = 10f64.powf(-3.0 * delay_seconds / t60) as f32;
        }
    }

    /// Mono in, stereo out. Adds into `out`.
    pub fn process(&mut self, input: &[f32], out: &mut [f32]) {
        if let Some(t60) = self.t60.acquire() {
            self.recompute_gains(t60);
        }
        if let Some(frequency) = self.damping_frequency.acquire() {
            for lowpass in &mut self.lowpass {
                lowpass.set_frequency(SR as f64, frequency);
            }
        }
        if let Some(seconds) = self.predelay.acquire() {
            self.predelay_samples = (seconds * SR as f64) as usize;
        }

        let feedback_scale = 2.0 / LINES as f32;
        for i in 0..BLOCK_SIZE {
            self.predelay_line.write(input[i]);
            let x = self.predelay_line.read(self.predelay_samples);

            let mut sum = 0.0;
            for j in 0..LINES {
                let delayed = self.lines[j].read(LINE_DELAYS[j] - 1);
                self.line_out[j] = self.lowpass[j].process(delayed);
                sum += self.line_out[j];
            }

            // Householder feedback: reflect the line vector about the all-ones
            // diagonal, then decay per line.
            for j in 0..LINES {
                let feedback = self.line_out[j] - feedback_scale * sum;
                self.lines[j].write(x * INPUT_GAIN + self.gains[j] * feedback);
            }

            let mut left = 0.0;
            let mut right = 0.0;
            for j in (0..LINES).step_by(2) {
                left += self.line_out[j];
                right += self.line_out[j + 1];
            }
            out[i * 2] += left * OUTPUT_GAIN;
            out[i * 2 + 1] += right * OUTPUT_GAIN;
        }
    }
}
