//! Routing between source outputs and effect inputs.
//!
//! The router is a declarative fan-out table: one level deep, one live route
//! per `(output, input)` pair, every gain transition fade-aware. It hands out
//! accumulation buffers; the actual mixing happens in [`route_audio`] when a
//! source pushes its block through its output.
//!
//! Handles are identified by monotonically increasing keys, which gives the
//! same arbitrary total order the address-identity scheme would. Routes for
//! one output are kept contiguous in a flat vector sorted by
//! `(output, input)`, so a source's destinations enumerate as one run.
//!
//! Nothing here is thread safe; the router lives on the audio thread and all
//! external mutation arrives through the command queue.
//!
//! [`route_audio`]: Router::route_audio

use auralis_dsp::mix_frame;

use crate::config::BLOCK_SIZE;

/// Identity of a routing output (a source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputKey(u64);

/// Identity of a routing input (an effect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InputKey(u64);

/// Placeholder keys for objects built on the control side before the audio
/// thread registers them.
impl OutputKey {
    pub(crate) const UNREGISTERED: OutputKey = OutputKey(0);
}

impl InputKey {
    pub(crate) const UNREGISTERED: InputKey = InputKey(0);
}

/// Life stages of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    /// Created, ramping from its starting gain up to the configured gain.
    FadeIn,
    /// At the configured gain.
    Steady,
    /// Gain was reconfigured; ramps over exactly one block.
    GainChanged,
    /// Ramping to zero, then dies.
    FadeOut,
    /// Removed at the end of the current block.
    Dead,
}

#[derive(Debug, Clone)]
struct Route {
    output: OutputKey,
    input: InputKey,
    state: RouteState,
    /// Router-local timestamp of the last state transition.
    last_state_changed: u64,
    fade_in_blocks: u32,
    fade_out_blocks: u32,
    /// Steady-state gain.
    gain: f32,
    /// Gain the current transition started from.
    prev_gain: f32,
}

impl Route {
    /// Gains at the start and end of the block at `time`, or `None` when the
    /// route contributes nothing.
    fn block_gains(&self, time: u64) -> Option<(f32, f32)> {
        match self.state {
            RouteState::Dead => None,
            RouteState::Steady => Some((self.gain, self.gain)),
            RouteState::GainChanged => {
                if time == self.last_state_changed {
                    Some((self.prev_gain, self.gain))
                } else {
                    Some((self.gain, self.gain))
                }
            }
            RouteState::FadeIn => {
                let fade = self.fade_in_blocks.max(1) as f32;
                let elapsed = time.saturating_sub(self.last_state_changed) as f32;
                let at = |e: f32| {
                    let progress = (e / fade).min(1.0);
                    self.prev_gain + (self.gain - self.prev_gain) * progress
                };
                Some((at(elapsed), at(elapsed + 1.0)))
            }
            RouteState::FadeOut => {
                let fade = self.fade_out_blocks.max(1) as f32;
                let elapsed = time.saturating_sub(self.last_state_changed) as f32;
                if elapsed >= fade {
                    return None;
                }
                let at = |e: f32| self.prev_gain * (1.0 - (e / fade).min(1.0));
                Some((at(elapsed), at(elapsed + 1.0)))
            }
        }
    }

    /// Instantaneous gain at the start of the block at `time`, for splicing
    /// transitions out of transitions.
    fn gain_at(&self, time: u64) -> f32 {
        self.block_gains(time).map_or(0.0, |(start, _)| start)
    }

    fn set_state(&mut self, state: RouteState, time: u64) {
        self.state = state;
        self.last_state_changed = time;
    }
}

struct InputSlot {
    key: InputKey,
    channels: usize,
    buffer: Vec<f32>,
}

/// The routing table for one context.
pub struct Router {
    routes: Vec<Route>,
    inputs: Vec<InputSlot>,
    time: u64,
    next_key: u64,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: Vec::with_capacity(256),
            inputs: Vec::with_capacity(16),
            time: 0,
            // 0 is reserved for the unregistered placeholders.
            next_key: 1,
        }
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    fn allocate_key(&mut self) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    /// Register the reader side of a route: an effect input accumulating
    /// `channels` channels. The mix buffer is allocated here, once.
    pub fn register_input(&mut self, channels: usize) -> InputKey {
        let key = InputKey(self.allocate_key());
        self.inputs.push(InputSlot {
            key,
            channels,
            buffer: vec![0.0; BLOCK_SIZE * channels],
        });
        key
    }

    /// Register the writer side of a route: a source output.
    pub fn register_output(&mut self) -> OutputKey {
        OutputKey(self.allocate_key())
    }

    /// Drop an input and all routes involving it. Synchronous, no fade: the
    /// effect is going away.
    pub fn unregister_input(&mut self, key: InputKey) {
        self.inputs.retain(|slot| slot.key != key);
        self.routes.retain(|route| route.input != key);
    }

    /// Drop an output and all routes involving it.
    pub fn unregister_output(&mut self, key: OutputKey) {
        self.routes.retain(|route| route.output != key);
    }

    /// The accumulated block for an input, as filled by this block's sources.
    pub fn input_buffer(&self, key: InputKey) -> Option<&[f32]> {
        self.inputs
            .iter()
            .find(|slot| slot.key == key)
            .map(|slot| slot.buffer.as_slice())
    }

    fn find_route(&self, output: OutputKey, input: InputKey) -> Option<usize> {
        self.routes
            .binary_search_by_key(&(output, input), |route| (route.output, route.input))
            .ok()
    }

    /// Start of the contiguous run of routes for `output`.
    fn find_run(&self, output: OutputKey) -> usize {
        self.routes.partition_point(|route| route.output < output)
    }

    /// Establish or update a route. Declarative: absent routes are inserted
    /// fading in, live ones are retargeted, dying ones revived. Every path
    /// ramps from the route's current instantaneous gain.
    pub fn configure_route(&mut self, output: OutputKey, input: InputKey, gain: f32, fade_in_blocks: u32) {
        if let Some(index) = self.find_route(output, input) {
            let time = self.time;
            let route = &mut self.routes[index];
            match route.state {
                RouteState::Dead => {
                    route.prev_gain = 0.0;
                    route.gain = gain;
                    route.fade_in_blocks = fade_in_blocks;
                    route.set_state(RouteState::FadeIn, time);
                }
                RouteState::FadeOut => {
                    // Revived mid-fade-out: fade back in from wherever we are.
                    route.prev_gain = route.gain_at(time);
                    route.gain = gain;
                    route.fade_in_blocks = fade_in_blocks;
                    route.set_state(RouteState::FadeIn, time);
                }
                RouteState::FadeIn | RouteState::Steady if route.gain == gain => {
                    // Idempotent: re-declaring the same gain changes nothing.
                }
                _ => {
                    route.prev_gain = route.gain_at(time);
                    route.gain = gain;
                    route.set_state(RouteState::GainChanged, time);
                }
            }
            return;
        }

        let index = self
            .routes
            .partition_point(|route| (route.output, route.input) < (output, input));
        self.routes.insert(
            index,
            Route {
                output,
                input,
                state: RouteState::FadeIn,
                last_state_changed: self.time,
                fade_in_blocks,
                fade_out_blocks: 1,
                gain,
                prev_gain: 0.0,
            },
        );
    }

    /// Begin removing a route. No-op if the pair has no live route.
    pub fn remove_route(&mut self, output: OutputKey, input: InputKey, fade_out_blocks: u32) {
        if let Some(index) = self.find_route(output, input) {
            let time = self.time;
            let route = &mut self.routes[index];
            if matches!(route.state, RouteState::Dead | RouteState::FadeOut) {
                return;
            }
            route.prev_gain = route.gain_at(time);
            route.fade_out_blocks = fade_out_blocks;
            route.set_state(RouteState::FadeOut, time);
        }
    }

    /// Fade out every route originating at `output`.
    pub fn remove_all_routes(&mut self, output: OutputKey, fade_out_blocks: u32) {
        let time = self.time;
        let start = self.find_run(output);
        for route in self.routes[start..]
            .iter_mut()
            .take_while(|route| route.output == output)
        {
            if matches!(route.state, RouteState::Dead | RouteState::FadeOut) {
                continue;
            }
            route.prev_gain = route.gain_at(time);
            route.fade_out_blocks = fade_out_blocks;
            route.set_state(RouteState::FadeOut, time);
        }
    }

    /// Mix one block from `output` into every routed input, applying each
    /// route's current gain shape with per-sample interpolation and
    /// converting channel counts as needed.
    pub fn route_audio(&mut self, output: OutputKey, buffer: &[f32], channels: usize) {
        debug_assert!(buffer.len() >= BLOCK_SIZE * channels);
        let time = self.time;
        let start = self.find_run(output);
        let routes = &self.routes[start..];
        let inputs = &mut self.inputs;

        for route in routes.iter().take_while(|route| route.output == output) {
            let Some((gain_start, gain_end)) = route.block_gains(time) else {
                continue;
            };
            let Some(slot) = inputs.iter_mut().find(|slot| slot.key == route.input) else {
                continue;
            };
            let step = (gain_end - gain_start) / BLOCK_SIZE as f32;
            for frame in 0..BLOCK_SIZE {
                let gain = gain_start + step * frame as f32;
                mix_frame(
                    &buffer[frame * channels..(frame + 1) * channels],
                    channels,
                    &mut slot.buffer[frame * slot.channels..(frame + 1) * slot.channels],
                    slot.channels,
                    gain,
                );
            }
        }
    }

    /// End-of-block maintenance: advance the state machine, collect dead
    /// routes, zero the input accumulators and step the router clock.
    pub fn finish_block(&mut self) {
        let next_time = self.time + 1;
        for route in &mut self.routes {
            match route.state {
                RouteState::FadeIn => {
                    if next_time - route.last_state_changed >= route.fade_in_blocks.max(1) as u64 {
                        route.set_state(RouteState::Steady, next_time);
                    }
                }
                RouteState::GainChanged => {
                    route.set_state(RouteState::Steady, next_time);
                }
                RouteState::FadeOut => {
                    if next_time - route.last_state_changed >= route.fade_out_blocks.max(1) as u64 {
                        route.set_state(RouteState::Dead, next_time);
                    }
                }
                RouteState::Steady | RouteState::Dead => {}
            }
        }
        self.routes.retain(|route| route.state != RouteState::Dead);

        for slot in &mut self.inputs {
            slot.buffer.fill(0.0);
        }
        self.time = next_time;
    }

    #[cfg(test)]
    fn route_state(&self, output: OutputKey, input: InputKey) -> Option<RouteState> {
        self.find_route(output, input).map(|i| self.routes[i].state)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
