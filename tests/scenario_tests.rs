//! End-to-end scenarios against headless contexts.

mod helpers;

use auralis::config::{BLOCK_SIZE, MASTER_CHANNELS, SR};
use auralis::{api, Context, EchoTapConfig, Property, RouteConfig};
use helpers::*;

#[test]
fn test_silent_empty_context() {
    ensure_engine();
    let context = Context::new_headless().unwrap();
    let output = render_blocks(&context, 100);
    assert!(output.iter().all(|&s| s == 0.0));
}

#[test]
fn test_constant_sine_loop() {
    ensure_engine();
    let context = Context::new_headless().unwrap();

    let sine = sine_samples(441, 100.0);
    let source = context.create_source_direct().unwrap();
    let generator = context.create_buffer_generator().unwrap();
    let buffer = api::create_buffer_from_samples(1, sine.clone()).unwrap();
    api::set_object(generator, Property::Buffer, Some(buffer)).unwrap();
    api::set_i64(generator, Property::Looping, 1).unwrap();
    api::set_f64(generator, Property::PitchBend, 1.0).unwrap();
    context.source_add_generator(source, generator).unwrap();

    let output = render_blocks(&context, 100);

    let mut error_energy = 0.0f64;
    let mut count = 0usize;
    for frame in 0..100 * BLOCK_SIZE {
        let expected = sine[frame % 441] * MONO_TO_STEREO;
        for ch in 0..MASTER_CHANNELS {
            let diff = (output[frame * MASTER_CHANNELS + ch] - expected) as f64;
            error_energy += diff * diff;
            count += 1;
        }
    }
    let rms = (error_energy / count as f64).sqrt();
    assert!(rms < 1e-6, "rms error {rms}");
}

#[test]
fn test_echo_taps_place_impulse_on_master() {
    ensure_engine();
    let context = Context::new_headless().unwrap();

    // Impulse lands at global sample BLOCK_SIZE, after the route's one-block
    // fade-in has completed.
    let mut samples = vec![0.0f32; BLOCK_SIZE * 2];
    samples[BLOCK_SIZE] = 1.0;
    let source = context.create_source_direct().unwrap();
    let generator = context.create_buffer_generator().unwrap();
    let buffer = api::create_buffer_from_samples(1, samples).unwrap();
    api::set_object(generator, Property::Buffer, Some(buffer)).unwrap();
    context.source_add_generator(source, generator).unwrap();

    let echo = context.create_global_echo().unwrap();
    context
        .echo_set_taps(
            echo,
            &[
                EchoTapConfig {
                    delay: 0.1,
                    gain_l: 1.0,
                    gain_r: 0.0,
                },
                EchoTapConfig {
                    delay: 0.2,
                    gain_l: 0.0,
                    gain_r: 1.0,
                },
            ],
        )
        .unwrap();
    context
        .routing_establish_route(
            source,
            echo,
            &RouteConfig {
                gain: 1.0,
                fade_in: 0.01,
            },
        )
        .unwrap();

    let impulse_at = BLOCK_SIZE;
    let left_at = impulse_at + (0.1 * SR as f64).round() as usize;
    let right_at = impulse_at + (0.2 * SR as f64).round() as usize;
    let blocks = right_at / BLOCK_SIZE + 2;
    let output = render_blocks(&context, blocks);

    let left = |frame: usize| output[frame * MASTER_CHANNELS];
    let right = |frame: usize| output[frame * MASTER_CHANNELS + 1];

    assert!((left(left_at) - 1.0).abs() < 1e-3, "left tap {}", left(left_at));
    assert!(right(left_at).abs() < 1e-4, "right at left tap");
    assert!((right(right_at) - 1.0).abs() < 1e-3, "right tap {}", right(right_at));
    assert!(left(right_at).abs() < 1e-4, "left at right tap");

    // The dry impulse also reached the master directly, equal-power split.
    assert!((left(impulse_at) - MONO_TO_STEREO).abs() < 1e-4);
}

/// Echo contribution to the left master channel, with the constant direct
/// path subtracted out.
fn echo_contribution(output: &[f32], direct_level: f32) -> Vec<f32> {
    output
        .iter()
        .step_by(MASTER_CHANNELS)
        .map(|&s| s - direct_level)
        .collect()
}

fn route_fade_rig(context: &Context) -> (auralis::Handle, auralis::Handle) {
    let (source, _generator) = dc_source(context, 1.0);
    let echo = context.create_global_echo().unwrap();
    context
        .echo_set_taps(
            echo,
            &[EchoTapConfig {
                delay: 0.0,
                gain_l: 1.0,
                gain_r: 0.0,
            }],
        )
        .unwrap();
    (source, echo)
}

#[test]
fn test_route_fade_envelope() {
    ensure_engine();
    let context = Context::new_headless().unwrap();
    let (source, echo) = route_fade_rig(&context);

    // Let the graph settle before the route appears.
    render_blocks(&context, 2);

    // 0.03 s is three blocks of fade-in.
    context
        .routing_establish_route(
            source,
            echo,
            &RouteConfig {
                gain: 1.0,
                fade_in: 0.03,
            },
        )
        .unwrap();

    let output = render_blocks(&context, 4);
    let contribution = echo_contribution(&output, MONO_TO_STEREO);

    // Block-end gains hit 1/3, 2/3, 1; block averages ride the midpoints.
    let averages = block_averages(&output, 0)
        .iter()
        .map(|avg| avg - MONO_TO_STEREO)
        .collect::<Vec<_>>();
    assert!((averages[0] - 1.0 / 6.0).abs() < 0.02, "{averages:?}");
    assert!((averages[1] - 0.5).abs() < 0.02, "{averages:?}");
    assert!((averages[2] - 5.0 / 6.0).abs() < 0.02, "{averages:?}");
    assert!((averages[3] - 1.0).abs() < 1e-4, "{averages:?}");

    for (block, target) in [(0usize, 1.0f32 / 3.0), (1, 2.0 / 3.0), (2, 1.0)] {
        let end = contribution[(block + 1) * BLOCK_SIZE - 1];
        assert!((end - target).abs() < 0.01, "block {block} ends at {end}");
    }

    // The whole ramp is click-free.
    let jump = contribution
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .fold(0.0, f32::max);
    assert!(jump <= 1.0 / BLOCK_SIZE as f32 + 1e-4, "jump {jump}");
}

#[test]
fn test_route_remove_and_re_add_is_continuous() {
    ensure_engine();
    let context = Context::new_headless().unwrap();
    let (source, echo) = route_fade_rig(&context);
    render_blocks(&context, 2);

    context
        .routing_establish_route(
            source,
            echo,
            &RouteConfig {
                gain: 1.0,
                fade_in: 0.01,
            },
        )
        .unwrap();
    render_blocks(&context, 3);

    // Start a two-block fade-out, let one block elapse, then re-declare the
    // route while it is still dying.
    context.routing_remove_route(source, echo, 0.02).unwrap();
    let during_removal = render_blocks(&context, 1);
    context
        .routing_establish_route(
            source,
            echo,
            &RouteConfig {
                gain: 1.0,
                fade_in: 0.03,
            },
        )
        .unwrap();
    let after_revival = render_blocks(&context, 5);

    let mut trace = echo_contribution(&during_removal, MONO_TO_STEREO);
    trace.extend(echo_contribution(&after_revival, MONO_TO_STEREO));

    let jump = trace
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .fold(0.0, f32::max);
    assert!(jump <= 1.0 / BLOCK_SIZE as f32 + 1e-4, "jump {jump}");

    // Back at full gain by the end.
    let tail = trace[trace.len() - 1];
    assert!((tail - 1.0).abs() < 1e-3, "tail {tail}");
}

#[test]
fn test_route_removal_reaches_silence() {
    ensure_engine();
    let context = Context::new_headless().unwrap();
    let (source, echo) = route_fade_rig(&context);
    render_blocks(&context, 2);

    context
        .routing_establish_route(source, echo, &RouteConfig::default())
        .unwrap();
    render_blocks(&context, 2);

    context.routing_remove_route(source, echo, 0.02).unwrap();
    render_blocks(&context, 2);
    let output = render_blocks(&context, 2);
    let contribution = echo_contribution(&output, MONO_TO_STEREO);
    let peak = contribution.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
    assert!(peak < 1e-4, "route still audible: {peak}");
}
