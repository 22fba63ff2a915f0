//! Symphonia-backed decoder.
//!
//! Probes the byte stream with Symphonia's format registry and drains packets
//! into a pending sample buffer, handing out interleaved f32 frames on demand.

use std::io;

use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::stream::ByteStream;
use crate::{AudioDecoder, DecodeError, Result};

/// Adapts a [`ByteStream`] to Symphonia's `MediaSource`.
struct ByteStreamSource {
    inner: Box<dyn ByteStream>,
}

impl io::Read for ByteStreamSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner
            .read(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

impl io::Seek for ByteStreamSource {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(offset) => offset as i64,
            io::SeekFrom::Current(delta) => self.inner.position() as i64 + delta,
            io::SeekFrom::End(delta) => {
                let len = self.inner.len_bytes().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::Unsupported, "stream length unknown")
                })?;
                len as i64 + delta
            }
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start",
            ));
        }
        self.inner
            .seek(target as u64)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(target as u64)
    }
}

impl MediaSource for ByteStreamSource {
    fn is_seekable(&self) -> bool {
        self.inner.supports_seek()
    }

    fn byte_len(&self) -> Option<u64> {
        self.inner.len_bytes()
    }
}

pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn CodecDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    /// Whether the underlying byte stream can seek, captured at open time.
    seekable: bool,
    time_base: Option<TimeBase>,
    n_frames: Option<u64>,
    sample_buf: Option<SampleBuffer<f32>>,
    pending: Vec<f32>,
    at_eof: bool,
}

impl SymphoniaDecoder {
    /// Probe `stream` and set up the codec for its default audio track.
    /// `path_hint` is only used for its extension.
    pub fn from_stream(stream: Box<dyn ByteStream>, path_hint: &str) -> Result<Self> {
        let mut hint = Hint::new();
        if let Some(ext) = std::path::Path::new(path_hint)
            .extension()
            .and_then(|e| e.to_str())
        {
            hint.with_extension(ext);
        }

        let seekable = stream.supports_seek();
        let source = ByteStreamSource { inner: stream };
        let mss = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::Decoding(format!("probe failed: {e}")))?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| DecodeError::Decoding("no default audio track".to_string()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| DecodeError::Decoding("unknown sample rate".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| DecodeError::Decoding("unknown channel count".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Decoding(format!("codec init failed: {e}")))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            seekable,
            time_base: params.time_base,
            n_frames: params.n_frames,
            sample_buf: None,
            pending: Vec::new(),
            at_eof: false,
        })
    }

    fn append_decoded(
        sample_buf_slot: &mut Option<SampleBuffer<f32>>,
        pending: &mut Vec<f32>,
        channels: usize,
        audio_buf: AudioBufferRef<'_>,
    ) {
        let spec = SignalSpec::new(audio_buf.spec().rate, audio_buf.spec().channels);
        let needs_realloc = sample_buf_slot
            .as_ref()
            .map_or(true, |buf| buf.capacity() < audio_buf.capacity() * channels);
        if needs_realloc {
            *sample_buf_slot = Some(SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec));
        }
        let Some(sample_buf) = sample_buf_slot.as_mut() else {
            return;
        };
        sample_buf.copy_interleaved_ref(audio_buf);
        pending.extend_from_slice(sample_buf.samples());
    }

    /// Pull packets until `pending` holds at least `want_samples` samples or
    /// the stream ends.
    fn fill_pending(&mut self, want_samples: usize) -> Result<()> {
        while self.pending.len() < want_samples && !self.at_eof {
            match self.format.next_packet() {
                Ok(packet) => {
                    if packet.track_id() != self.track_id {
                        continue;
                    }
                    match self.decoder.decode(&packet) {
                        Ok(audio_buf) => Self::append_decoded(
                            &mut self.sample_buf,
                            &mut self.pending,
                            self.channels,
                            audio_buf,
                        ),
                        Err(SymphoniaError::DecodeError(e)) => {
                            tracing::debug!("skipping undecodable packet: {e}");
                            continue;
                        }
                        Err(SymphoniaError::ResetRequired) => {
                            self.decoder.reset();
                            continue;
                        }
                        Err(e) => return Err(DecodeError::Decoding(format!("decode failed: {e}"))),
                    }
                }
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    self.at_eof = true;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                }
                Err(e) => return Err(DecodeError::Decoding(format!("read packet failed: {e}"))),
            }
        }
        Ok(())
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn write_samples_interleaved(&mut self, frames: usize, out: &mut [f32]) -> Result<usize> {
        let want_samples = frames * self.channels;
        debug_assert!(out.len() >= want_samples);
        self.fill_pending(want_samples)?;

        let take_samples = want_samples.min(self.pending.len());
        // Only hand out whole frames.
        let take_samples = take_samples - take_samples % self.channels;
        out[..take_samples].copy_from_slice(&self.pending[..take_samples]);
        self.pending.drain(..take_samples);
        Ok(take_samples / self.channels)
    }

    fn supports_seek(&self) -> bool {
        self.seekable
    }

    fn seek_seconds(&mut self, position: f64) -> Result<()> {
        if !self.seekable {
            return Err(DecodeError::ByteStreamUnsupportedOperation("seek"));
        }
        let position = position.max(0.0);
        let time = Time::new(position as u64, position.fract());
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| DecodeError::Decoding(format!("seek failed: {e}")))?;
        self.decoder.reset();
        self.pending.clear();
        self.at_eof = false;
        Ok(())
    }

    fn duration_seconds(&self) -> Option<f64> {
        let tb = self.time_base?;
        let frames = self.n_frames?;
        let t = tb.calc_time(frames);
        Some(t.seconds as f64 + t.frac)
    }
}
