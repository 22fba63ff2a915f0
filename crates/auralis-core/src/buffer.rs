//! Decoded, immutable sample buffers.
//!
//! A [`BufferData`] holds interleaved f32 frames at the engine sample rate;
//! import resamples as needed. Buffers are shared by reference count and never
//! mutate after creation, so the audio thread and any number of control
//! threads can read them concurrently.

use std::sync::Arc;

use auralis_decode::AudioDecoder;
use rubato::{
    Resampler, SincFixedOut, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::config::{BUFFER_CHUNK_FRAMES, SR};
use crate::error::{Error, Result};
use crate::properties::validate_channels;

/// Immutable interleaved sample data at the engine sample rate.
#[derive(Debug)]
pub struct BufferData {
    channels: usize,
    frames: usize,
    samples: Vec<f32>,
}

impl BufferData {
    pub fn new(channels: usize, samples: Vec<f32>) -> Result<Self> {
        validate_channels(channels)?;
        if samples.len() % channels != 0 {
            return Err(Error::Range(format!(
                "{} samples do not divide into {channels} channels",
                samples.len()
            )));
        }
        let frames = samples.len() / channels;
        if frames == 0 {
            return Err(Error::Decoding("buffers of zero length not supported".to_string()));
        }
        Ok(Self {
            channels,
            frames,
            samples,
        })
    }

    /// Decode an entire stream into a buffer, resampling to the engine rate
    /// when the decoder's native rate differs.
    pub fn from_decoder(decoder: &mut dyn AudioDecoder) -> Result<Self> {
        let channels = decoder.channels();
        validate_channels(channels)?;
        let native_sr = decoder.sample_rate();

        let samples = if native_sr == SR {
            read_all(decoder, channels)?
        } else {
            read_all_resampled(decoder, channels, native_sr)?
        };

        Self::new(channels, samples)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn len_frames(&self) -> usize {
        self.frames
    }

    pub fn len_seconds(&self) -> f64 {
        self.frames as f64 / SR as f64
    }

    /// Copy one frame into `out` (at least `channels` long). Frames past the
    /// end read as silence.
    #[inline]
    pub fn read_frame(&self, frame: usize, out: &mut [f32]) {
        if frame >= self.frames {
            out[..self.channels].fill(0.0);
            return;
        }
        let start = frame * self.channels;
        out[..self.channels].copy_from_slice(&self.samples[start..start + self.channels]);
    }
}

/// A cursor over a shared buffer, held by buffer generators.
#[derive(Default)]
pub struct BufferReader {
    buffer: Option<Arc<BufferData>>,
}

impl BufferReader {
    pub fn set_buffer(&mut self, buffer: Option<Arc<BufferData>>) -> Option<Arc<BufferData>> {
        std::mem::replace(&mut self.buffer, buffer)
    }

    pub fn buffer(&self) -> Option<&Arc<BufferData>> {
        self.buffer.as_ref()
    }

    pub fn channels(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.channels())
    }

    pub fn len_frames(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.len_frames())
    }

    #[inline]
    pub fn read_frame(&self, frame: usize, out: &mut [f32]) {
        if let Some(buffer) = &self.buffer {
            buffer.read_frame(frame, out);
        }
    }
}

fn read_all(decoder: &mut dyn AudioDecoder, channels: usize) -> Result<Vec<f32>> {
    let mut samples = Vec::new();
    let mut chunk = vec![0.0f32; BUFFER_CHUNK_FRAMES * channels];
    loop {
        let got = decoder.write_samples_interleaved(BUFFER_CHUNK_FRAMES, &mut chunk)?;
        if got == 0 {
            break;
        }
        samples.extend_from_slice(&chunk[..got * channels]);
        if got < BUFFER_CHUNK_FRAMES {
            break;
        }
    }
    Ok(samples)
}

fn read_all_resampled(
    decoder: &mut dyn AudioDecoder,
    channels: usize,
    native_sr: u32,
) -> Result<Vec<f32>> {
    let ratio = SR as f64 / native_sr as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedOut::<f32>::new(ratio, 2.0, params, BUFFER_CHUNK_FRAMES, channels)
        .map_err(|e| Error::Decoding(format!("failed to create resampler: {e}")))?;

    let mut input = resampler.input_buffer_allocate(true);
    let mut output = resampler.output_buffer_allocate(true);
    let mut interleaved = vec![0.0f32; resampler.input_frames_max() * channels];

    let mut samples = Vec::new();
    let mut total_in: u64 = 0;
    loop {
        let needed = resampler.input_frames_next();
        let got = decoder.write_samples_interleaved(needed, &mut interleaved[..needed * channels])?;
        total_in += got as u64;
        let last = got < needed;
        interleaved[got * channels..needed * channels].fill(0.0);

        for (ch, plane) in input.iter_mut().enumerate().take(channels) {
            plane.resize(needed, 0.0);
            for frame in 0..needed {
                plane[frame] = interleaved[frame * channels + ch];
            }
        }

        let (_, out_frames) = resampler
            .process_into_buffer(&input, &mut output, None)
            .map_err(|e| Error::Decoding(format!("resample failed: {e}")))?;

        for frame in 0..out_frames {
            for plane in output.iter().take(channels) {
                samples.push(plane[frame]);
            }
        }

        if last {
            break;
        }
    }

    // The final zero-padded chunk overshoots; trim to the exact converted
    // length.
    let expected_frames = ((total_in as f64) * ratio).round() as usize;
    samples.truncate(expected_frames * channels);
    Ok(samples)
}
