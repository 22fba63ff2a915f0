//! Buffer generator: interpolated playback of an in-memory buffer.

use std::sync::Arc;

use crate::buffer::{BufferData, BufferReader};
use crate::config::{BLOCK_SIZE, MAX_CHANNELS, SR};
use crate::fade::FadeDriver;
use crate::lockfree::AtomicDouble;
use crate::properties::PropSlot;

/// Reads a shared [`BufferData`] at a fractional frame position, with
/// optional pitch bend and looping.
pub(crate) struct BufferGenerator {
    reader: BufferReader,
    /// Fractional playhead in frames.
    position_samples: f64,
    position: PropSlot<f64>,
    pitch_bend: PropSlot<f64>,
    looping: PropSlot<i64>,
    position_report: Arc<AtomicDouble>,
    buffer_changed: bool,
    frame_a: [f32; MAX_CHANNELS],
    frame_b: [f32; MAX_CHANNELS],
}

impl BufferGenerator {
    pub fn new(position_report: Arc<AtomicDouble>) -> Self {
        Self {
            reader: BufferReader::default(),
            position_samples: 0.0,
            position: PropSlot::new(0.0),
            pitch_bend: PropSlot::new(1.0),
            looping: PropSlot::new(0),
            position_report,
            buffer_changed: false,
            frame_a: [0.0; MAX_CHANNELS],
            frame_b: [0.0; MAX_CHANNELS],
        }
    }

    pub fn channels(&self) -> usize {
        self.reader.channels()
    }

    pub fn set_position(&mut self, seconds: f64) {
        self.position.set(seconds);
    }

    pub fn set_pitch_bend(&mut self, pitch_bend: f64) {
        self.pitch_bend.set(pitch_bend);
    }

    pub fn set_looping(&mut self, looping: i64) {
        self.looping.set(looping);
    }

    /// Swap the buffer, returning the old one for deferred release. Playback
    /// restarts from the beginning of the new buffer.
    pub fn set_buffer(&mut self, buffer: Option<Arc<BufferData>>) -> Option<Arc<BufferData>> {
        self.buffer_changed = true;
        self.reader.set_buffer(buffer)
    }

    pub fn generate_block(&mut self, out: &mut [f32], gain_driver: &FadeDriver, block_time: u64) {
        if self.buffer_changed {
            self.buffer_changed = false;
            self.position_samples = 0.0;
            self.position.set_untracked(0.0);
        }

        let len = self.reader.len_frames();
        let channels = self.reader.channels();
        if len == 0 || channels == 0 {
            return;
        }

        if let Some(seconds) = self.position.acquire() {
            self.position_samples = (seconds * SR as f64).min(len as f64);
        }

        let pitch_bend = self.pitch_bend.get();
        let looping = self.looping.get() != 0;

        if (1.0 - pitch_bend).abs() > 0.001 {
            self.generate_pitch_bend(out, gain_driver, block_time, pitch_bend, looping);
        } else {
            self.generate_no_pitch_bend(out, gain_driver, block_time, looping);
        }

        let seconds = self.position_samples / SR as f64;
        self.position.set_untracked(seconds);
        self.position_report.set(seconds);
    }

    /// Fast path: advance exactly one frame per output sample.
    fn generate_no_pitch_bend(
        &mut self,
        out: &mut [f32],
        gain_driver: &FadeDriver,
        block_time: u64,
        looping: bool,
    ) {
        let len = self.reader.len_frames();
        let channels = self.reader.channels();
        gain_driver.drive(block_time, |gain| {
            let mut pos = self.position_samples.round() as usize;
            let mut i = 0;
            while i < BLOCK_SIZE {
                if pos >= len {
                    if looping {
                        pos = 0;
                    } else {
                        // End of a non-looping buffer: the rest of the block
                        // stays silent and the playhead stops advancing.
                        break;
                    }
                }
                self.reader.read_frame(pos, &mut self.frame_a);
                let g = gain.at(i);
                for ch in 0..channels {
                    out[i * channels + ch] += g * self.frame_a[ch];
                }
                pos += 1;
                i += 1;
            }
            self.position_samples = pos as f64;
        });
    }

    /// Pitch-bend path: advance `pitch_bend` frames per output sample with
    /// linear interpolation. Negative rates are legal and play backwards.
    fn generate_pitch_bend(
        &mut self,
        out: &mut [f32],
        gain_driver: &FadeDriver,
        block_time: u64,
        pitch_bend: f64,
        looping: bool,
    ) {
        let len = self.reader.len_frames();
        let channels = self.reader.channels();
        let flen = len as f64;
        gain_driver.drive(block_time, |gain| {
            let mut pos = self.position_samples;
            for i in 0..BLOCK_SIZE {
                if looping {
                    pos = pos.rem_euclid(flen);
                } else if !(0.0..flen).contains(&pos) {
                    break;
                }
                let lower = pos.floor();
                let upper = if looping {
                    (lower + 1.0) % flen
                } else {
                    (lower + 1.0).min(flen - 1.0)
                };
                let w2 = (pos - lower) as f32;
                let w1 = 1.0 - w2;
                self.reader.read_frame(lower as usize, &mut self.frame_a);
                self.reader.read_frame(upper as usize, &mut self.frame_b);
                let g = gain.at(i);
                for ch in 0..channels {
                    out[i * channels + ch] += g * (self.frame_a[ch] * w1 + self.frame_b[ch] * w2);
                }
                pos += pitch_bend;
            }
            self.position_samples = if looping {
                pos.rem_euclid(flen)
            } else {
                pos.clamp(0.0, flen)
            };
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer(frames: usize) -> Arc<BufferData> {
        let samples: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        Arc::new(BufferData::new(1, samples).unwrap())
    }

    fn generator_with(frames: usize) -> BufferGenerator {
        let mut gen = BufferGenerator::new(Arc::new(AtomicDouble::new(0.0)));
        gen.set_buffer(Some(ramp_buffer(frames)));
        gen
    }

    fn render(gen: &mut BufferGenerator, block_time: u64) -> Vec<f32> {
        let driver = FadeDriver::new(1.0, 1);
        let mut out = vec![0.0f32; BLOCK_SIZE];
        gen.generate_block(&mut out, &driver, block_time);
        out
    }

    #[test]
    fn test_reads_sequentially() {
        let mut gen = generator_with(BLOCK_SIZE * 4);
        let out = render(&mut gen, 0);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[100], 100.0);
        let out = render(&mut gen, 1);
        assert_eq!(out[0], BLOCK_SIZE as f32);
    }

    #[test]
    fn test_non_looping_ends_in_silence() {
        let mut gen = generator_with(100);
        let out = render(&mut gen, 0);
        assert_eq!(out[99], 99.0);
        assert_eq!(out[100], 0.0);
        assert_eq!(out[BLOCK_SIZE - 1], 0.0);
        // Playhead pinned at the end.
        let out = render(&mut gen, 1);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_loop_wrap_is_exact() {
        let frames = 441;
        let mut gen = generator_with(frames);
        gen.set_looping(1);
        let first = render(&mut gen, 0);
        for (i, &sample) in first.iter().enumerate() {
            assert_eq!(sample, (i % frames) as f32, "sample {i}");
        }
    }

    #[test]
    fn test_position_seek() {
        let mut gen = generator_with(BLOCK_SIZE * 8);
        gen.set_position(1024.0 / SR as f64);
        let out = render(&mut gen, 0);
        assert_eq!(out[0], 1024.0);
    }

    #[test]
    fn test_position_reported_without_change_tracking() {
        let report = Arc::new(AtomicDouble::new(0.0));
        let mut gen = BufferGenerator::new(report.clone());
        gen.set_buffer(Some(ramp_buffer(BLOCK_SIZE * 2)));
        render(&mut gen, 0);
        let expected = BLOCK_SIZE as f64 / SR as f64;
        assert!((report.get() - expected).abs() < 1e-9);
        // The report must not read back as a pending seek.
        assert_eq!(gen.position.acquire(), None);
    }

    #[test]
    fn test_pitch_bend_half_speed_interpolates() {
        let mut gen = generator_with(BLOCK_SIZE * 2);
        gen.set_pitch_bend(0.5);
        let out = render(&mut gen, 0);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.5).abs() < 1e-4);
        assert!((out[2] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_pitch_bend_double_speed() {
        let mut gen = generator_with(BLOCK_SIZE * 4);
        gen.set_pitch_bend(2.0);
        let out = render(&mut gen, 0);
        assert!((out[10] - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_negative_pitch_bend_stops_at_start() {
        let mut gen = generator_with(BLOCK_SIZE * 2);
        gen.set_position(64.0 / SR as f64);
        gen.set_pitch_bend(-1.0);
        let out = render(&mut gen, 0);
        // Plays backwards from 64, then halts at the start.
        assert!((out[0] - 64.0).abs() < 1e-4);
        assert!((out[63] - 1.0).abs() < 1e-4);
        assert_eq!(out[70], 0.0);
    }

    #[test]
    fn test_buffer_swap_resets_position() {
        let mut gen = generator_with(BLOCK_SIZE * 2);
        render(&mut gen, 0);
        let old = gen.set_buffer(Some(ramp_buffer(BLOCK_SIZE)));
        assert!(old.is_some());
        let out = render(&mut gen, 1);
        assert_eq!(out[0], 0.0);
    }
}
