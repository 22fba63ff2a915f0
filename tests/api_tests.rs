//! Control-API contract: validation, readback, lifetimes.

mod helpers;

use auralis::{api, BiquadConfig, Context, EchoTapConfig, Error, Handle, Property, RouteConfig};
use helpers::*;

fn bogus_handle() -> Handle {
    // A handle that was never allocated to anything resolvable: contexts
    // allocate monotonically, so a context we immediately drop leaves a dead
    // handle behind.
    let context = Context::new_headless().unwrap();
    let handle = context.create_source_direct().unwrap();
    drop(context);
    handle
}

#[test]
fn test_invalid_handle_rejected() {
    ensure_engine();
    let dead = bogus_handle();
    assert!(matches!(
        api::set_f64(dead, Property::Gain, 1.0),
        Err(Error::InvalidHandle)
    ));
    assert!(matches!(api::get_f64(dead, Property::Gain), Err(Error::InvalidHandle)));
    assert!(matches!(api::handle_free(dead), Err(Error::InvalidHandle)));
}

#[test]
fn test_invalid_property_rejected_without_mutation() {
    ensure_engine();
    let context = Context::new_headless().unwrap();
    let noise = context.create_noise_generator(2).unwrap();

    assert!(matches!(
        api::set_f64(noise, Property::PitchBend, 2.0),
        Err(Error::InvalidProperty)
    ));
    // Type mismatch on a valid property is also invalid.
    assert!(matches!(
        api::set_i64(noise, Property::Gain, 1),
        Err(Error::InvalidProperty)
    ));
    // Readback still shows the default.
    assert_eq!(api::get_f64(noise, Property::Gain).unwrap(), 1.0);
}

#[test]
fn test_range_validation() {
    ensure_engine();
    let context = Context::new_headless().unwrap();

    assert!(matches!(
        context.create_noise_generator(0),
        Err(Error::Range(_))
    ));

    let (source, generator) = dc_source(&context, 1.0);
    assert!(matches!(
        api::set_f64(source, Property::Gain, -1.0),
        Err(Error::Range(_))
    ));
    assert!(matches!(
        api::set_i64(generator, Property::Looping, 2),
        Err(Error::Range(_))
    ));
    assert!(matches!(
        api::set_f64(generator, Property::PlaybackPosition, f64::NAN),
        Err(Error::Range(_))
    ));
}

#[test]
fn test_property_readback_roundtrip() {
    ensure_engine();
    let context = Context::new_headless().unwrap();
    let source = context.create_source_3d().unwrap();

    api::set_f64(source, Property::Gain, 0.5).unwrap();
    assert_eq!(api::get_f64(source, Property::Gain).unwrap(), 0.5);

    api::set_double3(source, Property::Position, [1.0, 2.0, 3.0]).unwrap();
    assert_eq!(
        api::get_double3(source, Property::Position).unwrap(),
        [1.0, 2.0, 3.0]
    );

    let orientation = [0.0, 0.0, -1.0, 0.0, 1.0, 0.0];
    api::set_double6(source, Property::Orientation, orientation).unwrap();
    assert_eq!(
        api::get_double6(source, Property::Orientation).unwrap(),
        orientation
    );

    let filter = BiquadConfig::lowpass(44100.0, 1000.0, 0.7071);
    api::set_biquad(source, Property::Filter, filter).unwrap();
    assert_eq!(api::get_biquad(source, Property::Filter).unwrap(), filter);
}

#[test]
fn test_buffer_introspection_and_object_property() {
    ensure_engine();
    let context = Context::new_headless().unwrap();
    let buffer = api::create_buffer_from_samples(2, vec![0.0; 88200]).unwrap();

    assert_eq!(api::buffer_get_channels(buffer).unwrap(), 2);
    assert_eq!(api::buffer_get_length_in_samples(buffer).unwrap(), 44100);
    assert_eq!(api::buffer_get_length_in_seconds(buffer).unwrap(), 1.0);

    let generator = context.create_buffer_generator().unwrap();
    api::set_object(generator, Property::Buffer, Some(buffer)).unwrap();
    assert_eq!(
        api::get_object(generator, Property::Buffer).unwrap(),
        Some(buffer)
    );

    // A non-buffer object is not assignable.
    let source = context.create_source_direct().unwrap();
    assert!(api::set_object(generator, Property::Buffer, Some(source)).is_err());

    api::set_object(generator, Property::Buffer, None).unwrap();
    assert_eq!(api::get_object(generator, Property::Buffer).unwrap(), None);
}

#[test]
fn test_freed_source_goes_silent() {
    ensure_engine();
    let context = Context::new_headless().unwrap();
    let (source, _) = dc_source(&context, 1.0);
    let output = render_blocks(&context, 2);
    assert!(output.iter().any(|&s| s != 0.0));

    api::handle_free(source).unwrap();
    render_blocks(&context, 1);
    let output = render_blocks(&context, 2);
    assert!(output.iter().all(|&s| s == 0.0));
}

#[test]
fn test_freed_generator_survives_inside_source() {
    ensure_engine();
    let context = Context::new_headless().unwrap();
    let (source, generator) = dc_source(&context, 1.0);
    render_blocks(&context, 1);

    // The external reference goes away; the source's internal reference keeps
    // the generator alive and audible.
    api::handle_free(generator).unwrap();
    render_blocks(&context, 1);
    let output = render_blocks(&context, 2);
    assert!(output.iter().any(|&s| s != 0.0));

    // Control calls on the freed handle now fail.
    assert!(matches!(
        api::set_f64(generator, Property::Gain, 0.5),
        Err(Error::InvalidHandle)
    ));

    // Dropping the last internal reference silences it.
    context.source_remove_generator(source, generator).unwrap_err();
    // (The handle is dead for the control API; removal goes through the
    // source instead when the source itself is freed.)
    api::handle_free(source).unwrap();
    render_blocks(&context, 1);
    let output = render_blocks(&context, 1);
    assert!(output.iter().all(|&s| s == 0.0));
}

#[test]
fn test_routing_requires_matching_kinds() {
    ensure_engine();
    let context = Context::new_headless().unwrap();
    let (source, generator) = dc_source(&context, 1.0);
    let echo = context.create_global_echo().unwrap();

    // Generator is not a valid route output; effect is not a valid input for
    // itself.
    assert!(matches!(
        context.routing_establish_route(generator, echo, &RouteConfig::default()),
        Err(Error::InvalidHandle)
    ));
    assert!(matches!(
        context.routing_establish_route(source, source, &RouteConfig::default()),
        Err(Error::InvalidHandle)
    ));
    assert!(context
        .routing_establish_route(source, echo, &RouteConfig::default())
        .is_ok());

    // Negative gains are rejected.
    assert!(matches!(
        context.routing_establish_route(
            source,
            echo,
            &RouteConfig {
                gain: -1.0,
                fade_in: 0.0
            }
        ),
        Err(Error::Range(_))
    ));
}

#[test]
fn test_echo_tap_validation() {
    ensure_engine();
    let context = Context::new_headless().unwrap();
    let echo = context.create_global_echo().unwrap();

    assert!(matches!(
        context.echo_set_taps(
            echo,
            &[EchoTapConfig {
                delay: 100.0,
                gain_l: 1.0,
                gain_r: 1.0
            }]
        ),
        Err(Error::Range(_))
    ));
    assert!(context
        .echo_set_taps(
            echo,
            &[EchoTapConfig {
                delay: 0.25,
                gain_l: 0.5,
                gain_r: 0.5
            }]
        )
        .is_ok());
}

#[test]
fn test_cross_context_objects_rejected() {
    ensure_engine();
    let context_a = Context::new_headless().unwrap();
    let context_b = Context::new_headless().unwrap();
    let source_a = context_a.create_source_direct().unwrap();
    let generator_b = context_b.create_buffer_generator().unwrap();

    assert!(matches!(
        context_a.source_add_generator(source_a, generator_b),
        Err(Error::InvalidHandle)
    ));
}

#[test]
fn test_render_block_requires_headless() {
    ensure_engine();
    let context = Context::new_headless().unwrap();
    let mut too_small = vec![0.0f32; 16];
    assert!(matches!(
        context.render_block(&mut too_small),
        Err(Error::Range(_))
    ));
}
