//! Audio device output.
//!
//! The cpal stream is created and owned by a dedicated host thread, so the
//! `!Send` stream never crosses threads and contexts stay `Send`. The device
//! callback pulls whole blocks from the engine through a carry buffer that
//! absorbs the mismatch between device buffer sizes and [`BLOCK_SIZE`].
//!
//! [`BLOCK_SIZE`]: crate::config::BLOCK_SIZE

use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::config::{BLOCK_SIZE, MASTER_CHANNELS, SR};
use crate::context::EngineState;
use crate::error::{Error, Result};

/// Adapts the block-synchronous engine to arbitrary device buffer sizes.
struct BlockAdapter {
    engine: EngineState,
    carry: Vec<f32>,
    carry_pos: usize,
}

impl BlockAdapter {
    fn new(engine: EngineState) -> Self {
        Self {
            engine,
            carry: vec![0.0; BLOCK_SIZE * MASTER_CHANNELS],
            // Start empty: the first fill renders a fresh block.
            carry_pos: BLOCK_SIZE * MASTER_CHANNELS,
        }
    }

    /// Fill `output` (interleaved stereo samples) from whole engine blocks.
    fn fill(&mut self, output: &mut [f32]) {
        let mut written = 0;
        while written < output.len() {
            if self.carry_pos == self.carry.len() {
                let mut block = std::mem::take(&mut self.carry);
                self.engine.generate_block(&mut block);
                self.carry = block;
                self.carry_pos = 0;
            }
            let take = (output.len() - written).min(self.carry.len() - self.carry_pos);
            output[written..written + take]
                .copy_from_slice(&self.carry[self.carry_pos..self.carry_pos + take]);
            self.carry_pos += take;
            written += take;
        }
    }
}

/// Handle to the audio host thread. Dropping stops the stream.
pub(crate) struct OutputWorker {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl OutputWorker {
    /// Spawn the host thread, build the stream, and wait for it to start.
    pub fn start(engine: EngineState) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        let thread = thread::Builder::new()
            .name("auralis-audio-host".into())
            .spawn(move || host_thread(engine, stop_rx, ready_tx))
            .map_err(|e| Error::Internal(format!("spawn audio host thread: {e}")))?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(Self {
                stop_tx,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(Error::Internal("audio host thread did not start".to_string())),
        }
    }

    pub fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for OutputWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn host_thread(engine: EngineState, stop_rx: Receiver<()>, ready_tx: Sender<Result<()>>) {
    let stream = match build_stream(engine) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(e.into()));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Park until told to stop; the stream lives (and dies) on this thread.
    let _ = stop_rx.recv();
    drop(stream);
}

fn build_stream(engine: EngineState) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(Error::NoDevice)?;
    let config = device.default_output_config()?;

    if config.sample_rate().0 != SR {
        tracing::warn!(
            device_rate = config.sample_rate().0,
            engine_rate = SR,
            "device sample rate differs from engine rate; playback will be detuned"
        );
    }

    match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream_typed::<f32>(&device, &config.into(), engine),
        cpal::SampleFormat::I16 => build_stream_typed::<i16>(&device, &config.into(), engine),
        cpal::SampleFormat::U16 => build_stream_typed::<u16>(&device, &config.into(), engine),
        format => Err(Error::Internal(format!(
            "unsupported device sample format: {format:?}"
        ))),
    }
}

fn build_stream_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    engine: EngineState,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let device_channels = config.channels as usize;
    let mut adapter = BlockAdapter::new(engine);
    let mut stereo_scratch: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            // Per-object containment lives in the scheduler; this is the
            // last resort so the audio thread never unwinds into the device
            // layer.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let frames = data.len() / device_channels;
                stereo_scratch.resize(frames * MASTER_CHANNELS, 0.0);
                adapter.fill(&mut stereo_scratch);

                for (i, sample) in data.iter_mut().enumerate() {
                    let channel = i % device_channels;
                    let frame = i / device_channels;
                    let value = if channel < MASTER_CHANNELS {
                        stereo_scratch[frame * MASTER_CHANNELS + channel]
                    } else {
                        0.0
                    };
                    *sample = T::from_sample(value);
                }
            }));

            if result.is_err() {
                for sample in data.iter_mut() {
                    *sample = T::from_sample(0.0);
                }
                tracing::error!("device callback panicked; emitting silence");
            }
        },
        |err| {
            tracing::error!("audio stream error: {err}");
        },
        None,
    )?;

    Ok(stream)
}
