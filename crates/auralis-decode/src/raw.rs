//! In-memory PCM decoder.
//!
//! Wraps a pre-decoded interleaved buffer in the [`AudioDecoder`] contract.
//! Used by tests that need exact, deterministic decoder behavior, and useful
//! for feeding procedurally generated audio through the streaming path.

use crate::{AudioDecoder, DecodeError, Result};

pub struct RawDecoder {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
    /// Cursor in frames.
    position: usize,
}

impl RawDecoder {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(DecodeError::Decoding("0-channel raw stream".to_string()));
        }
        if samples.len() % channels != 0 {
            return Err(DecodeError::Decoding(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
            position: 0,
        })
    }

    pub fn len_frames(&self) -> usize {
        self.samples.len() / self.channels
    }
}

impl AudioDecoder for RawDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn write_samples_interleaved(&mut self, frames: usize, out: &mut [f32]) -> Result<usize> {
        let available = self.len_frames().saturating_sub(self.position);
        let take = frames.min(available);
        let start = self.position * self.channels;
        let end = start + take * self.channels;
        out[..take * self.channels].copy_from_slice(&self.samples[start..end]);
        self.position += take;
        Ok(take)
    }

    fn supports_seek(&self) -> bool {
        true
    }

    fn seek_seconds(&mut self, position: f64) -> Result<()> {
        let frame = (position.max(0.0) * self.sample_rate as f64).round() as usize;
        self.position = frame.min(self.len_frames());
        Ok(())
    }

    fn duration_seconds(&self) -> Option<f64> {
        Some(self.len_frames() as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, channels: usize) -> RawDecoder {
        let samples: Vec<f32> = (0..frames * channels).map(|i| i as f32).collect();
        RawDecoder::new(samples, 44100, channels).unwrap()
    }

    #[test]
    fn test_rejects_zero_channels() {
        assert!(RawDecoder::new(vec![], 44100, 0).is_err());
    }

    #[test]
    fn test_rejects_ragged_buffer() {
        assert!(RawDecoder::new(vec![0.0; 3], 44100, 2).is_err());
    }

    #[test]
    fn test_reads_until_eof() {
        let mut d = ramp(100, 2);
        let mut out = vec![0.0; 128 * 2];
        assert_eq!(d.write_samples_interleaved(64, &mut out).unwrap(), 64);
        assert_eq!(d.write_samples_interleaved(64, &mut out).unwrap(), 36);
        assert_eq!(d.write_samples_interleaved(64, &mut out).unwrap(), 0);
    }

    #[test]
    fn test_seek_in_frames() {
        let mut d = ramp(44100, 1);
        d.seek_seconds(0.5).unwrap();
        let mut out = [0.0; 4];
        d.write_samples_interleaved(4, &mut out).unwrap();
        assert_eq!(out[0], 22050.0);
    }

    #[test]
    fn test_duration() {
        let d = ramp(22050, 2);
        assert_eq!(d.duration_seconds(), Some(0.5));
    }
}
