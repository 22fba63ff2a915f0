//! Shared helpers for the integration suites.

#![allow(dead_code)]

use auralis::config::{BLOCK_SIZE, MASTER_CHANNELS, SR};
use auralis::{api, Context, Handle, Property};

/// Equal-power gain applied when mono generators hit the stereo master.
pub const MONO_TO_STEREO: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Bring the engine up once per test process. Tests never shut it down, so
/// parallel tests within one binary share it safely.
pub fn ensure_engine() {
    match auralis::initialize() {
        Ok(()) => {}
        Err(auralis::Error::AlreadyInitialized) => {}
        Err(e) => panic!("engine initialization failed: {e}"),
    }
}

/// Render `blocks` blocks from a headless context, concatenated interleaved
/// stereo.
pub fn render_blocks(context: &Context, blocks: usize) -> Vec<f32> {
    let mut output = Vec::with_capacity(blocks * BLOCK_SIZE * MASTER_CHANNELS);
    let mut block = vec![0.0f32; BLOCK_SIZE * MASTER_CHANNELS];
    for _ in 0..blocks {
        context.render_block(&mut block).expect("render failed");
        output.extend_from_slice(&block);
    }
    output
}

/// A one-cycle sine at `frequency` Hz, `frames` frames, mono.
pub fn sine_samples(frames: usize, frequency: f64) -> Vec<f32> {
    (0..frames)
        .map(|i| {
            (2.0 * std::f64::consts::PI * frequency * i as f64 / SR as f64).sin() as f32
        })
        .collect()
}

/// A direct source looping a mono buffer of constant `value`.
pub fn dc_source(context: &Context, value: f32) -> (Handle, Handle) {
    let source = context.create_source_direct().unwrap();
    let generator = context.create_buffer_generator().unwrap();
    let buffer = api::create_buffer_from_samples(1, vec![value; SR as usize]).unwrap();
    api::set_object(generator, Property::Buffer, Some(buffer)).unwrap();
    api::set_i64(generator, Property::Looping, 1).unwrap();
    context.source_add_generator(source, generator).unwrap();
    (source, generator)
}

/// Largest absolute jump between adjacent samples of one channel.
pub fn max_adjacent_jump(interleaved: &[f32], channel: usize) -> f32 {
    let samples: Vec<f32> = interleaved
        .iter()
        .skip(channel)
        .step_by(MASTER_CHANNELS)
        .copied()
        .collect();
    samples
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .fold(0.0, f32::max)
}

/// Per-block averages of one channel.
pub fn block_averages(interleaved: &[f32], channel: usize) -> Vec<f32> {
    interleaved
        .chunks(BLOCK_SIZE * MASTER_CHANNELS)
        .map(|block| {
            block
                .iter()
                .skip(channel)
                .step_by(MASTER_CHANNELS)
                .sum::<f32>()
                / BLOCK_SIZE as f32
        })
        .collect()
}
