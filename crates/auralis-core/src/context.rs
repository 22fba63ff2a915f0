//! Contexts: one audio device (or headless pump), one mix graph.
//!
//! [`Context`] is the control-side object: a factory for sources, generators
//! and effects, and the owner of the command queue into the audio thread.
//! [`EngineState`] is the audio-side half, the per-block scheduler: drain
//! commands, run sources, run effects, finish the router block, apply the
//! master gain fade.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use auralis_decode::AudioDecoder;

use crate::commands::{command_queue, Command, CommandSender, CommandValue, DeletionQueue};
use crate::config::{fade_seconds_to_blocks, BLOCK_SIZE, COMMANDS_PER_BLOCK, MASTER_CHANNELS};
use crate::effects::echo::{convert_taps, EchoEffect, EchoTapConfig};
use crate::effects::reverb::FdnReverbEffect;
use crate::effects::{EffectKind, EffectObject};
use crate::error::{Error, Result};
use crate::fade::FadeDriver;
use crate::generator::{GeneratorKind, GeneratorObject};
use crate::generators::buffer::BufferGenerator;
use crate::generators::noise::NoiseGenerator;
use crate::generators::streaming::StreamingGenerator;
use crate::handle::{Handle, ObjectEntry, ObjectKind};
use crate::lockfree::AtomicDouble;
use crate::output::OutputWorker;
use crate::properties::{
    default_shadow, validate_channels, Pausable, PropSlot, Property,
};
use crate::router::{InputKey, OutputKey, Router};
use crate::runtime::{self, Runtime};
use crate::sources::{ListenerState, SourceKind, SourceObject};

/// Gain and fade-in for [`Context::routing_establish_route`].
#[derive(Debug, Clone, Copy)]
pub struct RouteConfig {
    pub gain: f64,
    /// Fade-in time in seconds, converted to whole blocks (minimum one).
    pub fade_in: f64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            gain: 1.0,
            fade_in: 0.0,
        }
    }
}

enum Backend {
    Device(OutputWorker),
    Headless(Mutex<EngineState>),
}

/// A running engine instance.
pub struct Context {
    handle: Handle,
    commands: CommandSender,
    runtime: Arc<Runtime>,
    backend: Backend,
}

impl Context {
    /// Create a context driving the default audio device.
    pub fn new() -> Result<Self> {
        Self::build(false)
    }

    /// Create a context with no device; blocks are rendered by
    /// [`render_block`](Self::render_block).
    pub fn new_headless() -> Result<Self> {
        Self::build(true)
    }

    fn build(headless: bool) -> Result<Self> {
        let runtime = runtime::global()?;
        let handle = Handle::allocate();
        let (commands, receiver) = command_queue();
        let engine = EngineState::new(handle, receiver, runtime.deletion_queue());

        let backend = if headless {
            Backend::Headless(Mutex::new(engine))
        } else {
            Backend::Device(OutputWorker::start(engine)?)
        };

        runtime.registry.insert(
            handle,
            ObjectEntry {
                kind: ObjectKind::Context,
                context: None,
                commands: Some(commands.clone()),
                shadow: Mutex::new(default_shadow(ObjectKind::Context)),
                position_report: None,
                buffer: None,
            },
        );

        Ok(Self {
            handle,
            commands,
            runtime,
            backend,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Render one block into `destination` (at least `BLOCK_SIZE * 2` interleaved
    /// stereo samples). Headless contexts only.
    pub fn render_block(&self, destination: &mut [f32]) -> Result<()> {
        if destination.len() < BLOCK_SIZE * MASTER_CHANNELS {
            return Err(Error::Range(format!(
                "destination holds {} samples; a block needs {}",
                destination.len(),
                BLOCK_SIZE * MASTER_CHANNELS
            )));
        }
        match &self.backend {
            Backend::Headless(engine) => {
                let mut engine = engine.lock();
                // Same containment as the device callback: a panic that
                // escaped the per-object guards yields silence, not unwind.
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    engine.generate_block(destination)
                }));
                if result.is_err() {
                    destination[..BLOCK_SIZE * MASTER_CHANNELS].fill(0.0);
                    tracing::error!("block render panicked; emitting silence");
                }
                Ok(())
            }
            Backend::Device(_) => Err(Error::NotHeadless),
        }
    }

    fn register_child(
        &self,
        handle: Handle,
        kind: ObjectKind,
        position_report: Option<Arc<AtomicDouble>>,
    ) {
        self.runtime.registry.insert(
            handle,
            ObjectEntry {
                kind,
                context: Some(self.handle),
                commands: Some(self.commands.clone()),
                shadow: Mutex::new(default_shadow(kind)),
                position_report,
                buffer: None,
            },
        );
    }

    fn create_source(&self, tag: ObjectKind, kind: SourceKind) -> Result<Handle> {
        let handle = Handle::allocate();
        let source = Box::new(SourceObject::new(handle, kind));
        self.register_child(handle, tag, None);
        self.commands.post(Command::RegisterSource { source });
        Ok(handle)
    }

    pub fn create_source_direct(&self) -> Result<Handle> {
        self.create_source(ObjectKind::SourceDirect, SourceKind::direct())
    }

    pub fn create_source_panned(&self) -> Result<Handle> {
        self.create_source(ObjectKind::SourcePanned, SourceKind::panned())
    }

    pub fn create_source_3d(&self) -> Result<Handle> {
        self.create_source(ObjectKind::Source3D, SourceKind::spatial())
    }

    pub fn create_buffer_generator(&self) -> Result<Handle> {
        let handle = Handle::allocate();
        let position_report = Arc::new(AtomicDouble::new(0.0));
        let generator = Box::new(GeneratorObject::new(
            handle,
            GeneratorKind::Buffer(BufferGenerator::new(position_report.clone())),
        ));
        self.register_child(handle, ObjectKind::BufferGenerator, Some(position_report));
        self.commands.post(Command::RegisterGenerator { generator });
        Ok(handle)
    }

    /// Stream audio acquired through the byte-stream protocol registry and
    /// decoded by the container probe.
    pub fn create_streaming_generator(
        &self,
        protocol: &str,
        path: &str,
        options: &str,
    ) -> Result<Handle> {
        let decoder = auralis_decode::decoder_for_protocol(protocol, path, options)?;
        self.create_streaming_generator_from_decoder(decoder)
    }

    /// Stream audio from a caller-supplied decoder.
    pub fn create_streaming_generator_from_decoder(
        &self,
        decoder: Box<dyn AudioDecoder>,
    ) -> Result<Handle> {
        let handle = Handle::allocate();
        let position_report = Arc::new(AtomicDouble::new(0.0));
        let streaming = StreamingGenerator::new(decoder, position_report.clone())?;
        let generator = Box::new(GeneratorObject::new(
            handle,
            GeneratorKind::Streaming(streaming),
        ));
        self.register_child(handle, ObjectKind::StreamingGenerator, Some(position_report));
        self.commands.post(Command::RegisterGenerator { generator });
        Ok(handle)
    }

    pub fn create_noise_generator(&self, channels: usize) -> Result<Handle> {
        // Seeded by handle so output is reproducible run to run.
        let handle = Handle::allocate();
        self.create_noise_generator_at(handle, channels, handle.raw())
    }

    /// Noise generator with an explicit seed, for deterministic renders.
    pub fn create_noise_generator_with_seed(&self, channels: usize, seed: u64) -> Result<Handle> {
        self.create_noise_generator_at(Handle::allocate(), channels, seed)
    }

    fn create_noise_generator_at(
        &self,
        handle: Handle,
        channels: usize,
        seed: u64,
    ) -> Result<Handle> {
        validate_channels(channels)?;
        let generator = Box::new(GeneratorObject::new(
            handle,
            GeneratorKind::Noise(NoiseGenerator::new(channels, seed)),
        ));
        self.register_child(handle, ObjectKind::NoiseGenerator, None);
        self.commands.post(Command::RegisterGenerator { generator });
        Ok(handle)
    }

    pub fn create_global_echo(&self) -> Result<Handle> {
        let handle = Handle::allocate();
        let effect = Box::new(EffectObject::new(handle, EffectKind::Echo(EchoEffect::new())));
        self.register_child(handle, ObjectKind::GlobalEcho, None);
        self.commands.post(Command::RegisterEffect { effect });
        Ok(handle)
    }

    pub fn create_global_fdn_reverb(&self) -> Result<Handle> {
        let handle = Handle::allocate();
        let effect = Box::new(EffectObject::new(
            handle,
            EffectKind::FdnReverb(FdnReverbEffect::new()),
        ));
        self.register_child(handle, ObjectKind::GlobalFdnReverb, None);
        self.commands.post(Command::RegisterEffect { effect });
        Ok(handle)
    }

    fn check_child(&self, handle: Handle, want: impl Fn(ObjectKind) -> bool) -> Result<()> {
        let entry = self.runtime.registry.get(handle)?;
        if !want(entry.kind) || entry.context != Some(self.handle) {
            return Err(Error::InvalidHandle);
        }
        Ok(())
    }

    pub fn source_add_generator(&self, source: Handle, generator: Handle) -> Result<()> {
        self.check_child(source, ObjectKind::is_source)?;
        self.check_child(generator, ObjectKind::is_generator)?;
        self.commands.post(Command::AddGenerator { source, generator });
        Ok(())
    }

    pub fn source_remove_generator(&self, source: Handle, generator: Handle) -> Result<()> {
        self.check_child(source, ObjectKind::is_source)?;
        self.check_child(generator, ObjectKind::is_generator)?;
        self.commands
            .post(Command::RemoveGenerator { source, generator });
        Ok(())
    }

    pub fn echo_set_taps(&self, effect: Handle, taps: &[EchoTapConfig]) -> Result<()> {
        self.check_child(effect, |kind| kind == ObjectKind::GlobalEcho)?;
        let taps = convert_taps(taps)?;
        self.commands.post(Command::SetEchoTaps { effect, taps });
        Ok(())
    }

    /// Declare (or retarget) the route from `output`'s source to `input`'s
    /// effect.
    pub fn routing_establish_route(
        &self,
        output: Handle,
        input: Handle,
        config: &RouteConfig,
    ) -> Result<()> {
        self.check_child(output, ObjectKind::is_source)?;
        self.check_child(input, ObjectKind::is_effect)?;
        if !config.gain.is_finite() || config.gain < 0.0 {
            return Err(Error::Range("route gain must be finite and >= 0".to_string()));
        }
        self.commands.post(Command::EstablishRoute {
            output,
            input,
            gain: config.gain,
            fade_in_blocks: fade_seconds_to_blocks(config.fade_in),
        });
        Ok(())
    }

    pub fn routing_remove_route(
        &self,
        output: Handle,
        input: Handle,
        fade_out_seconds: f64,
    ) -> Result<()> {
        self.check_child(output, ObjectKind::is_source)?;
        self.check_child(input, ObjectKind::is_effect)?;
        self.commands.post(Command::RemoveRoute {
            output,
            input,
            fade_out_blocks: fade_seconds_to_blocks(fade_out_seconds),
        });
        Ok(())
    }

    pub fn routing_remove_all_routes(&self, output: Handle, fade_out_seconds: f64) -> Result<()> {
        self.check_child(output, ObjectKind::is_source)?;
        self.commands.post(Command::RemoveAllRoutes {
            output,
            fade_out_blocks: fade_seconds_to_blocks(fade_out_seconds),
        });
        Ok(())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Stop the device first so the audio thread is gone before handles
        // disappear.
        if let Backend::Device(worker) = &mut self.backend {
            worker.stop();
        }
        self.runtime.registry.remove_context_objects(self.handle);
    }
}

/// Run one object's render with panic containment. A panicking source or
/// effect stops contributing for the rest of the block, the failure is
/// logged, and the remaining graph keeps running; the audio thread never
/// unwinds into the device callback.
fn render_guard(what: &str, handle: Handle, render: impl FnOnce()) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(render));
    if result.is_err() {
        tracing::error!(
            object = handle.raw(),
            "{what} render panicked; substituting silence"
        );
    }
}

/// Audio-side state: the whole mix graph plus the scheduler loop.
pub(crate) struct EngineState {
    context_handle: Handle,
    commands: Receiver<Command>,
    deletions: DeletionQueue,
    sources: Vec<SourceObject>,
    effects: Vec<EffectObject>,
    generators: HashMap<Handle, GeneratorObject>,
    router: Router,
    master: Vec<f32>,
    block_time: u64,
    gain: PropSlot<f64>,
    gain_driver: FadeDriver,
    pause: Pausable,
    listener_position: PropSlot<[f64; 3]>,
    listener_orientation: PropSlot<[f64; 6]>,
    listener: ListenerState,
}

impl EngineState {
    pub fn new(
        context_handle: Handle,
        commands: Receiver<Command>,
        deletions: DeletionQueue,
    ) -> Self {
        Self {
            context_handle,
            commands,
            deletions,
            // Reserved up front; the audio thread only reallocates if a graph
            // outgrows these.
            sources: Vec::with_capacity(64),
            effects: Vec::with_capacity(16),
            generators: HashMap::with_capacity(128),
            router: Router::new(),
            master: vec![0.0; BLOCK_SIZE * MASTER_CHANNELS],
            block_time: 0,
            gain: PropSlot::new(1.0),
            gain_driver: FadeDriver::new(1.0, 1),
            pause: Pausable::default(),
            listener_position: PropSlot::new([0.0; 3]),
            listener_orientation: PropSlot::new([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
            listener: ListenerState::default(),
        }
    }

    pub fn block_time(&self) -> u64 {
        self.block_time
    }

    /// Produce one block of interleaved stereo into `destination`.
    pub fn generate_block(&mut self, destination: &mut [f32]) {
        self.run_commands();

        let gain_changed = self.gain.acquire().is_some();
        let pause_changed = self.pause.take_dirty();
        if gain_changed || pause_changed {
            let gain = self.gain.get() * self.pause.gain_factor();
            self.gain_driver.set_value(self.block_time, gain as f32);
        }

        let out = &mut destination[..BLOCK_SIZE * MASTER_CHANNELS];
        out.fill(0.0);

        // Fully paused: silence, clocks frozen, until play.
        if self.pause.is_paused() && !self.gain_driver.is_active_at_time(self.block_time, 0.0) {
            return;
        }

        if let Some(position) = self.listener_position.acquire() {
            self.listener.position = position;
        }
        if let Some(orientation) = self.listener_orientation.acquire() {
            self.listener.set_orientation(orientation);
        }

        self.master.fill(0.0);
        let block_time = self.block_time;

        {
            let Self {
                sources,
                generators,
                router,
                master,
                listener,
                ..
            } = self;
            for source in sources.iter_mut() {
                let handle = source.handle;
                render_guard("source", handle, || {
                    source.run(generators, router, master, block_time, listener)
                });
            }
        }

        {
            let Self {
                effects,
                router,
                master,
                deletions,
                ..
            } = self;
            for effect in effects.iter_mut() {
                let handle = effect.handle;
                render_guard("effect", handle, || effect.run(router, master, block_time));
                if let Some(garbage) = effect.take_retired() {
                    deletions.discard(garbage);
                }
            }
        }

        self.router.finish_block();

        self.gain_driver.drive(block_time, |gain| {
            for i in 0..BLOCK_SIZE {
                let g = gain.at(i);
                for ch in 0..MASTER_CHANNELS {
                    let idx = i * MASTER_CHANNELS + ch;
                    out[idx] = self.master[idx] * g;
                }
            }
        });

        self.block_time += 1;
    }

    /// Drain a bounded number of commands so one busy control thread cannot
    /// starve the block.
    fn run_commands(&mut self) {
        for _ in 0..COMMANDS_PER_BLOCK {
            match self.commands.try_recv() {
                Ok(command) => self.apply_command(command),
                Err(_) => break,
            }
        }
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::SetProperty {
                target,
                property,
                value,
            } => self.apply_property(target, property, value),
            Command::SetPaused { target, paused } => {
                if target == self.context_handle {
                    self.pause.set_paused(paused);
                } else if let Some(source) =
                    self.sources.iter_mut().find(|s| s.handle == target)
                {
                    source.set_paused(paused);
                } else if let Some(generator) = self.generators.get_mut(&target) {
                    generator.set_paused(paused);
                }
            }
            Command::RegisterSource { mut source } => {
                source.output_key = self.router.register_output();
                self.sources.push(*source);
            }
            Command::RegisterEffect { mut effect } => {
                effect.input_key = self.router.register_input(effect.input_channels());
                self.effects.push(*effect);
            }
            Command::RegisterGenerator { generator } => {
                self.generators.insert(generator.handle, *generator);
            }
            Command::AddGenerator { source, generator } => {
                let Some(src) = self.sources.iter_mut().find(|s| s.handle == source) else {
                    return;
                };
                if src.generators.contains(&generator) {
                    return;
                }
                if let Some(gen) = self.generators.get_mut(&generator) {
                    gen.ref_count += 1;
                    src.generators.push(generator);
                }
            }
            Command::RemoveGenerator { source, generator } => {
                let removed = self
                    .sources
                    .iter_mut()
                    .find(|s| s.handle == source)
                    .and_then(|src| {
                        let pos = src.generators.iter().position(|h| *h == generator)?;
                        src.generators.remove(pos);
                        Some(())
                    });
                if removed.is_some() {
                    self.release_generator_ref(generator);
                }
            }
            Command::EstablishRoute {
                output,
                input,
                gain,
                fade_in_blocks,
            } => {
                if let (Some(output), Some(input)) =
                    (self.output_key_of(output), self.input_key_of(input))
                {
                    self.router
                        .configure_route(output, input, gain as f32, fade_in_blocks);
                }
            }
            Command::RemoveRoute {
                output,
                input,
                fade_out_blocks,
            } => {
                if let (Some(output), Some(input)) =
                    (self.output_key_of(output), self.input_key_of(input))
                {
                    self.router.remove_route(output, input, fade_out_blocks);
                }
            }
            Command::RemoveAllRoutes {
                output,
                fade_out_blocks,
            } => {
                if let Some(output) = self.output_key_of(output) {
                    self.router.remove_all_routes(output, fade_out_blocks);
                }
            }
            Command::SetEchoTaps { effect, taps } => {
                if let Some(obj) = self.effects.iter_mut().find(|e| e.handle == effect) {
                    if let Some(garbage) = obj.set_taps(taps) {
                        self.deletions.discard(garbage);
                    }
                } else {
                    self.deletions.discard(Box::new(taps));
                }
            }
            Command::FreeObject { target } => self.free_object(target),
        }
    }

    fn apply_property(&mut self, target: Handle, property: Property, value: CommandValue) {
        if target == self.context_handle {
            match (property, value) {
                (Property::Gain, CommandValue::F64(v)) => self.gain.set(v),
                (Property::Position, CommandValue::Double3(v)) => self.listener_position.set(v),
                (Property::Orientation, CommandValue::Double6(v)) => {
                    self.listener_orientation.set(v)
                }
                (property, _) => {
                    tracing::debug!(?property, "ignoring property not applicable to context")
                }
            }
            return;
        }

        let garbage = if let Some(source) = self.sources.iter_mut().find(|s| s.handle == target) {
            source.apply_property(property, value)
        } else if let Some(generator) = self.generators.get_mut(&target) {
            generator.apply_property(property, value)
        } else if let Some(effect) = self.effects.iter_mut().find(|e| e.handle == target) {
            effect.apply_property(property, value)
        } else {
            // Object already freed; drop any payload off-thread.
            match value {
                CommandValue::Buffer(Some(buffer)) => Some(Box::new(buffer) as _),
                _ => None,
            }
        };
        if let Some(garbage) = garbage {
            self.deletions.discard(garbage);
        }
    }

    fn output_key_of(&self, handle: Handle) -> Option<OutputKey> {
        self.sources
            .iter()
            .find(|s| s.handle == handle)
            .map(|s| s.output_key)
    }

    fn input_key_of(&self, handle: Handle) -> Option<InputKey> {
        self.effects
            .iter()
            .find(|e| e.handle == handle)
            .map(|e| e.input_key)
    }

    /// Remove an object whose external handle was freed. Sources and effects
    /// go immediately; generators linger while sources still hold them.
    fn free_object(&mut self, target: Handle) {
        if let Some(pos) = self.sources.iter().position(|s| s.handle == target) {
            let mut source = self.sources.remove(pos);
            self.router.unregister_output(source.output_key);
            let generators = std::mem::take(&mut source.generators);
            self.deletions.discard(Box::new(source));
            for generator in generators {
                self.release_generator_ref(generator);
            }
            return;
        }
        if let Some(pos) = self.effects.iter().position(|e| e.handle == target) {
            let effect = self.effects.remove(pos);
            self.router.unregister_input(effect.input_key);
            self.deletions.discard(Box::new(effect));
            return;
        }
        if let Some(generator) = self.generators.get_mut(&target) {
            generator.external_alive = false;
            if generator.ref_count == 0 {
                if let Some(generator) = self.generators.remove(&target) {
                    self.deletions.discard(Box::new(generator));
                }
            }
        }
    }

    fn release_generator_ref(&mut self, handle: Handle) {
        if let Some(generator) = self.generators.get_mut(&handle) {
            generator.ref_count = generator.ref_count.saturating_sub(1);
            if generator.ref_count == 0 && !generator.external_alive {
                if let Some(generator) = self.generators.remove(&handle) {
                    self.deletions.discard(Box::new(generator));
                }
            }
        }
    }
}
