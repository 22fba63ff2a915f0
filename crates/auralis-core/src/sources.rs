//! Sources: generator hosts that feed the master bus and the router.
//!
//! A source renders its generators into a premix at the source's processing
//! channel count, applies its filter and gain fade, hands the premix to every
//! route hanging off its output, then spatializes (or passes through) into
//! the stereo master.

use std::collections::HashMap;

use auralis_dsp::{
    azimuth_gains, distance_attenuation, mix_frame, scalar_gains, BiquadConfig, BiquadState,
    DistanceModel, DistanceParams, PanGains,
};

use crate::commands::{CommandValue, Garbage};
use crate::config::{BLOCK_SIZE, MASTER_CHANNELS, MAX_CHANNELS};
use crate::fade::FadeDriver;
use crate::generator::GeneratorObject;
use crate::handle::Handle;
use crate::properties::{Pausable, PropSlot, Property};
use crate::router::{OutputKey, Router};

/// Listener pose, owned by the context.
#[derive(Debug, Clone)]
pub(crate) struct ListenerState {
    pub position: [f64; 3],
    pub at: [f64; 3],
    pub up: [f64; 3],
}

impl Default for ListenerState {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            at: [0.0, 1.0, 0.0],
            up: [0.0, 0.0, 1.0],
        }
    }
}

impl ListenerState {
    pub fn set_orientation(&mut self, orientation: [f64; 6]) {
        self.at = [orientation[0], orientation[1], orientation[2]];
        self.up = [orientation[3], orientation[4], orientation[5]];
    }

    fn relative(&self, point: [f64; 3]) -> [f64; 3] {
        [
            point[0] - self.position[0],
            point[1] - self.position[1],
            point[2] - self.position[2],
        ]
    }

    pub fn distance_of(&self, point: [f64; 3]) -> f64 {
        let v = self.relative(point);
        (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
    }

    /// Azimuth of `point` in degrees, 0 straight ahead, positive to the right.
    pub fn azimuth_of(&self, point: [f64; 3]) -> f64 {
        let v = self.relative(point);
        let right = cross(self.at, self.up);
        let x = dot(v, right);
        let y = dot(v, self.at);
        if x == 0.0 && y == 0.0 {
            return 0.0;
        }
        x.atan2(y).to_degrees()
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Ramps pan gains across a block so pan movements stay click-free.
#[derive(Debug, Clone)]
struct PanSmoother {
    current: PanGains,
    target: PanGains,
}

impl PanSmoother {
    fn new() -> Self {
        let center = PanGains::center();
        Self {
            current: center,
            target: center,
        }
    }

    fn set_target(&mut self, target: PanGains) {
        self.target = target;
    }

    /// Pan `mono` into the stereo `master`, interpolating gains across the
    /// block. Adds, never overwrites.
    fn mix(&mut self, mono: &[f32], master: &mut [f32]) {
        let dl = self.target.left - self.current.left;
        let dr = self.target.right - self.current.right;
        for i in 0..BLOCK_SIZE {
            let t = i as f32 / BLOCK_SIZE as f32;
            let l = self.current.left + dl * t;
            let r = self.current.right + dr * t;
            master[i * 2] += mono[i] * l;
            master[i * 2 + 1] += mono[i] * r;
        }
        self.current = self.target;
    }
}

pub(crate) enum SourceKind {
    /// Premix goes to the master untouched (stereo).
    Direct,
    /// Mono premix through a user-positioned equal-power panner.
    Panned {
        panning_scalar: PropSlot<f64>,
        azimuth: PropSlot<f64>,
        pan: PanSmoother,
    },
    /// Mono premix spatialized from a world position.
    Spatial {
        position: PropSlot<[f64; 3]>,
        orientation: PropSlot<[f64; 6]>,
        distance_model: PropSlot<i64>,
        distance_ref: PropSlot<f64>,
        distance_max: PropSlot<f64>,
        rolloff: PropSlot<f64>,
        pan: PanSmoother,
    },
}

impl SourceKind {
    pub fn direct() -> Self {
        SourceKind::Direct
    }

    pub fn panned() -> Self {
        SourceKind::Panned {
            panning_scalar: PropSlot::new(0.0),
            azimuth: PropSlot::new(0.0),
            pan: PanSmoother::new(),
        }
    }

    pub fn spatial() -> Self {
        let defaults = DistanceParams::default();
        SourceKind::Spatial {
            position: PropSlot::new([0.0; 3]),
            orientation: PropSlot::new([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
            distance_model: PropSlot::new(defaults.model.as_i64()),
            distance_ref: PropSlot::new(defaults.distance_ref),
            distance_max: PropSlot::new(defaults.distance_max),
            rolloff: PropSlot::new(defaults.rolloff),
            pan: PanSmoother::new(),
        }
    }
}

/// Audio-side state for one source.
pub(crate) struct SourceObject {
    pub handle: Handle,
    pub external_alive: bool,
    pub kind: SourceKind,
    pub generators: Vec<Handle>,
    pub output_key: OutputKey,
    gain: PropSlot<f64>,
    gain_driver: FadeDriver,
    pause: Pausable,
    filter: PropSlot<BiquadConfig>,
    filter_config: BiquadConfig,
    filter_states: [BiquadState; MASTER_CHANNELS],
    premix: Vec<f32>,
    gen_scratch: Vec<f32>,
}

impl SourceObject {
    pub fn new(handle: Handle, kind: SourceKind) -> Self {
        Self {
            handle,
            external_alive: true,
            kind,
            generators: Vec::with_capacity(16),
            output_key: OutputKey::UNREGISTERED,
            gain: PropSlot::new(1.0),
            gain_driver: FadeDriver::new(1.0, 1),
            pause: Pausable::default(),
            filter: PropSlot::new(BiquadConfig::identity()),
            filter_config: BiquadConfig::identity(),
            filter_states: [BiquadState::default(); MASTER_CHANNELS],
            premix: vec![0.0; BLOCK_SIZE * MASTER_CHANNELS],
            gen_scratch: vec![0.0; BLOCK_SIZE * MAX_CHANNELS],
        }
    }

    fn premix_channels(&self) -> usize {
        match self.kind {
            SourceKind::Direct => MASTER_CHANNELS,
            SourceKind::Panned { .. } | SourceKind::Spatial { .. } => 1,
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.pause.set_paused(paused);
    }

    /// Render one block: generators -> premix -> (filter, gain, routes) ->
    /// master.
    pub fn run(
        &mut self,
        generators: &mut HashMap<Handle, GeneratorObject>,
        router: &mut Router,
        master: &mut [f32],
        block_time: u64,
        listener: &ListenerState,
    ) {
        let premix_channels = self.premix_channels();
        let premix_len = BLOCK_SIZE * premix_channels;
        self.premix[..premix_len].fill(0.0);

        for handle in &self.generators {
            let Some(generator) = generators.get_mut(handle) else {
                continue;
            };
            let gen_channels = generator.channels();
            if gen_channels == 0 {
                continue;
            }
            let scratch = &mut self.gen_scratch[..BLOCK_SIZE * gen_channels];
            scratch.fill(0.0);
            generator.run(scratch, block_time);
            for frame in 0..BLOCK_SIZE {
                mix_frame(
                    &scratch[frame * gen_channels..(frame + 1) * gen_channels],
                    gen_channels,
                    &mut self.premix[frame * premix_channels..(frame + 1) * premix_channels],
                    premix_channels,
                    1.0,
                );
            }
        }

        let gain_changed = self.gain.acquire().is_some();
        let pause_changed = self.pause.take_dirty();
        if gain_changed || pause_changed {
            let gain = self.gain.get() * self.pause.gain_factor();
            self.gain_driver.set_value(block_time, gain as f32);
        }

        if let Some(config) = self.filter.acquire() {
            self.filter_config = config;
        }
        if !self.filter_config.is_identity() {
            for frame in 0..BLOCK_SIZE {
                for ch in 0..premix_channels {
                    let idx = frame * premix_channels + ch;
                    self.premix[idx] = self.filter_states[ch].process(&self.filter_config, self.premix[idx]);
                }
            }
        }

        self.gain_driver.drive(block_time, |gain| {
            for frame in 0..BLOCK_SIZE {
                let g = gain.at(frame);
                for ch in 0..premix_channels {
                    self.premix[frame * premix_channels + ch] *= g;
                }
            }
        });

        // Fan out the processed premix to every route on this source.
        router.route_audio(self.output_key, &self.premix[..premix_len], premix_channels);

        match &mut self.kind {
            SourceKind::Direct => {
                for (master_sample, premix_sample) in
                    master.iter_mut().zip(&self.premix[..premix_len])
                {
                    *master_sample += premix_sample;
                }
            }
            SourceKind::Panned {
                panning_scalar,
                azimuth,
                pan,
            } => {
                if let Some(scalar) = panning_scalar.acquire() {
                    pan.set_target(scalar_gains(scalar));
                }
                if let Some(degrees) = azimuth.acquire() {
                    pan.set_target(azimuth_gains(degrees));
                }
                pan.mix(&self.premix[..BLOCK_SIZE], master);
            }
            SourceKind::Spatial {
                position,
                orientation,
                distance_model,
                distance_ref,
                distance_max,
                rolloff,
                pan,
            } => {
                position.acquire();
                orientation.acquire();
                distance_model.acquire();
                distance_ref.acquire();
                distance_max.acquire();
                rolloff.acquire();

                let params = DistanceParams {
                    model: DistanceModel::from_i64(distance_model.get()).unwrap_or_default(),
                    distance_ref: distance_ref.get(),
                    distance_max: distance_max.get(),
                    rolloff: rolloff.get(),
                };
                let point = position.get();
                let attenuation = distance_attenuation(&params, listener.distance_of(point)) as f32;
                let mut gains = azimuth_gains(listener.azimuth_of(point));
                gains.left *= attenuation;
                gains.right *= attenuation;
                pan.set_target(gains);
                pan.mix(&self.premix[..BLOCK_SIZE], master);
            }
        }
    }

    /// Apply a drained property command.
    pub fn apply_property(&mut self, property: Property, value: CommandValue) -> Option<Garbage> {
        match (&mut self.kind, property, value) {
            (_, Property::Gain, CommandValue::F64(v)) => self.gain.set(v),
            (_, Property::Filter, CommandValue::Biquad(config)) => self.filter.set(config),
            (SourceKind::Panned { panning_scalar, .. }, Property::PanningScalar, CommandValue::F64(v)) => {
                panning_scalar.set(v)
            }
            (SourceKind::Panned { azimuth, .. }, Property::Azimuth, CommandValue::F64(v)) => {
                azimuth.set(v)
            }
            (SourceKind::Spatial { position, .. }, Property::Position, CommandValue::Double3(v)) => {
                position.set(v)
            }
            (SourceKind::Spatial { orientation, .. }, Property::Orientation, CommandValue::Double6(v)) => {
                orientation.set(v)
            }
            (SourceKind::Spatial { distance_model, .. }, Property::DistanceModel, CommandValue::I64(v)) => {
                distance_model.set(v)
            }
            (SourceKind::Spatial { distance_ref, .. }, Property::DistanceRef, CommandValue::F64(v)) => {
                distance_ref.set(v)
            }
            (SourceKind::Spatial { distance_max, .. }, Property::DistanceMax, CommandValue::F64(v)) => {
                distance_max.set(v)
            }
            (SourceKind::Spatial { rolloff, .. }, Property::Rolloff, CommandValue::F64(v)) => {
                rolloff.set(v)
            }
            (_, property, _) => {
                tracing::debug!(?property, "ignoring property not applicable to source");
            }
        }
        None
    }
}
