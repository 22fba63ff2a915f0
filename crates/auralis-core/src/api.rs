//! Handle-keyed control API.
//!
//! These free functions mirror the engine's external contract: every call
//! resolves its handle through the live-objects table, validates fully before
//! enqueueing anything, and fails without side effects. Setters compile to a
//! command post plus a shadow update; getters read the shadow (or, for
//! playback positions, the value the audio side last reported).

use std::sync::Arc;

use auralis_decode::AudioDecoder;
use auralis_dsp::BiquadConfig;

use crate::buffer::BufferData;
use crate::commands::{Command, CommandValue};
use crate::config::SR;
use crate::error::{Error, Result};
use crate::handle::{Handle, ObjectEntry, ObjectKind};
use crate::properties::{validate, Property, PropertyValue};
use crate::runtime;

fn post_set(
    entry: &Arc<ObjectEntry>,
    handle: Handle,
    property: Property,
    shadow_value: PropertyValue,
    command_value: CommandValue,
) -> Result<()> {
    let commands = entry.commands.as_ref().ok_or(Error::InvalidHandle)?;
    commands.post(Command::SetProperty {
        target: handle,
        property,
        value: command_value,
    });
    entry.shadow.lock().insert(property, shadow_value);
    Ok(())
}

pub fn set_f64(handle: Handle, property: Property, value: f64) -> Result<()> {
    let entry = runtime::global()?.registry.get(handle)?;
    let shadow = PropertyValue::F64(value);
    validate(entry.kind, property, &shadow)?;
    post_set(&entry, handle, property, shadow, CommandValue::F64(value))
}

pub fn set_i64(handle: Handle, property: Property, value: i64) -> Result<()> {
    let entry = runtime::global()?.registry.get(handle)?;
    let shadow = PropertyValue::I64(value);
    validate(entry.kind, property, &shadow)?;
    post_set(&entry, handle, property, shadow, CommandValue::I64(value))
}

pub fn set_double3(handle: Handle, property: Property, value: [f64; 3]) -> Result<()> {
    let entry = runtime::global()?.registry.get(handle)?;
    let shadow = PropertyValue::Double3(value);
    validate(entry.kind, property, &shadow)?;
    post_set(&entry, handle, property, shadow, CommandValue::Double3(value))
}

pub fn set_double6(handle: Handle, property: Property, value: [f64; 6]) -> Result<()> {
    let entry = runtime::global()?.registry.get(handle)?;
    let shadow = PropertyValue::Double6(value);
    validate(entry.kind, property, &shadow)?;
    post_set(&entry, handle, property, shadow, CommandValue::Double6(value))
}

pub fn set_biquad(handle: Handle, property: Property, value: BiquadConfig) -> Result<()> {
    let entry = runtime::global()?.registry.get(handle)?;
    let shadow = PropertyValue::Biquad(value);
    validate(entry.kind, property, &shadow)?;
    post_set(&entry, handle, property, shadow, CommandValue::Biquad(value))
}

/// Set an object-typed property (currently only [`Property::Buffer`]).
/// `None` clears the reference.
pub fn set_object(handle: Handle, property: Property, object: Option<Handle>) -> Result<()> {
    let runtime = runtime::global()?;
    let entry = runtime.registry.get(handle)?;
    let shadow = PropertyValue::Object(object);
    validate(entry.kind, property, &shadow)?;

    let resolved = match object {
        None => None,
        Some(buffer_handle) => {
            let buffer_entry = runtime
                .registry
                .get_kind(buffer_handle, |kind| kind == ObjectKind::Buffer)?;
            Some(
                buffer_entry
                    .buffer
                    .clone()
                    .ok_or(Error::Internal("buffer entry without data".to_string()))?,
            )
        }
    };
    post_set(&entry, handle, property, shadow, CommandValue::Buffer(resolved))
}

fn shadow_value(handle: Handle, property: Property) -> Result<PropertyValue> {
    let entry = runtime::global()?.registry.get(handle)?;
    if property == Property::PlaybackPosition {
        if let Some(report) = &entry.position_report {
            return Ok(PropertyValue::F64(report.get()));
        }
    }
    let value = entry.shadow.lock().get(&property).copied();
    value.ok_or(Error::InvalidProperty)
}

pub fn get_f64(handle: Handle, property: Property) -> Result<f64> {
    match shadow_value(handle, property)? {
        PropertyValue::F64(v) => Ok(v),
        _ => Err(Error::InvalidProperty),
    }
}

pub fn get_i64(handle: Handle, property: Property) -> Result<i64> {
    match shadow_value(handle, property)? {
        PropertyValue::I64(v) => Ok(v),
        _ => Err(Error::InvalidProperty),
    }
}

pub fn get_double3(handle: Handle, property: Property) -> Result<[f64; 3]> {
    match shadow_value(handle, property)? {
        PropertyValue::Double3(v) => Ok(v),
        _ => Err(Error::InvalidProperty),
    }
}

pub fn get_double6(handle: Handle, property: Property) -> Result<[f64; 6]> {
    match shadow_value(handle, property)? {
        PropertyValue::Double6(v) => Ok(v),
        _ => Err(Error::InvalidProperty),
    }
}

pub fn get_biquad(handle: Handle, property: Property) -> Result<BiquadConfig> {
    match shadow_value(handle, property)? {
        PropertyValue::Biquad(v) => Ok(v),
        _ => Err(Error::InvalidProperty),
    }
}

pub fn get_object(handle: Handle, property: Property) -> Result<Option<Handle>> {
    match shadow_value(handle, property)? {
        PropertyValue::Object(v) => Ok(v),
        _ => Err(Error::InvalidProperty),
    }
}

fn set_paused(handle: Handle, paused: bool) -> Result<()> {
    let entry = runtime::global()?.registry.get(handle)?;
    let pausable = entry.kind == ObjectKind::Context
        || entry.kind.is_source()
        || entry.kind.is_generator();
    if !pausable {
        return Err(Error::InvalidHandle);
    }
    let commands = entry.commands.as_ref().ok_or(Error::InvalidHandle)?;
    commands.post(Command::SetPaused {
        target: handle,
        paused,
    });
    Ok(())
}

/// Pause a context, source or generator. Click-free: the object fades out
/// over one block and keeps its clocks running.
pub fn pause(handle: Handle) -> Result<()> {
    set_paused(handle, true)
}

pub fn play(handle: Handle) -> Result<()> {
    set_paused(handle, false)
}

/// Release the external reference to an object. The object stays alive while
/// the graph still holds it (a generator inside a source keeps sounding) and
/// is finalized on the deletion thread once the last reference drops.
pub fn handle_free(handle: Handle) -> Result<()> {
    let runtime = runtime::global()?;
    let entry = runtime.registry.get(handle)?;
    match entry.kind {
        ObjectKind::Context => {
            // Contexts are owned Rust values; freeing the handle only
            // invalidates external lookups.
            runtime.registry.remove(handle);
        }
        ObjectKind::Buffer => {
            if let Some(entry) = runtime.registry.remove(handle) {
                // Generators may still share the data; the entry's reference
                // drops off-thread.
                runtime.deletion_queue().discard(Box::new(entry));
            }
        }
        _ => {
            if let Some(commands) = &entry.commands {
                commands.post(Command::FreeObject { target: handle });
            }
            runtime.registry.remove(handle);
        }
    }
    Ok(())
}

fn register_buffer(data: BufferData) -> Result<Handle> {
    let runtime = runtime::global()?;
    let handle = Handle::allocate();
    runtime.registry.insert(
        handle,
        ObjectEntry {
            kind: ObjectKind::Buffer,
            context: None,
            commands: None,
            shadow: parking_lot::Mutex::new(std::collections::HashMap::new()),
            position_report: None,
            buffer: Some(Arc::new(data)),
        },
    );
    Ok(handle)
}

/// Decode an entire stream (resolved through the protocol registry) into an
/// immutable buffer.
pub fn create_buffer_from_stream(protocol: &str, path: &str, options: &str) -> Result<Handle> {
    let mut decoder = auralis_decode::decoder_for_protocol(protocol, path, options)?;
    let data = BufferData::from_decoder(decoder.as_mut())?;
    register_buffer(data)
}

/// Decode a caller-supplied decoder into an immutable buffer.
pub fn create_buffer_from_decoder(decoder: &mut dyn AudioDecoder) -> Result<Handle> {
    let data = BufferData::from_decoder(decoder)?;
    register_buffer(data)
}

/// Build a buffer directly from interleaved samples at the engine rate.
pub fn create_buffer_from_samples(channels: usize, samples: Vec<f32>) -> Result<Handle> {
    register_buffer(BufferData::new(channels, samples)?)
}

pub fn buffer_get_channels(handle: Handle) -> Result<usize> {
    let entry = runtime::global()?
        .registry
        .get_kind(handle, |kind| kind == ObjectKind::Buffer)?;
    Ok(entry.buffer.as_ref().map_or(0, |b| b.channels()))
}

pub fn buffer_get_length_in_samples(handle: Handle) -> Result<usize> {
    let entry = runtime::global()?
        .registry
        .get_kind(handle, |kind| kind == ObjectKind::Buffer)?;
    Ok(entry.buffer.as_ref().map_or(0, |b| b.len_frames()))
}

pub fn buffer_get_length_in_seconds(handle: Handle) -> Result<f64> {
    Ok(buffer_get_length_in_samples(handle)? as f64 / SR as f64)
}
