//! Block-timed gain fades.
//!
//! Every gain-like quantity in the engine changes through a [`FadeDriver`] so
//! that no mutation ever steps the signal discontinuously. Time is measured in
//! whole blocks; within a block the driver hands out a per-sample linear
//! interpolation between the block-boundary values.

use crate::config::BLOCK_SIZE;

/// A linear ramp between two block timestamps.
#[derive(Debug, Clone, Copy)]
pub struct LinearFader {
    start_time: u64,
    start_value: f32,
    end_time: u64,
    end_value: f32,
}

impl LinearFader {
    /// A fader that holds `value` forever.
    pub fn constant(value: f32) -> Self {
        Self {
            start_time: 0,
            start_value: value,
            end_time: 0,
            end_value: value,
        }
    }

    pub fn new(start_time: u64, start_value: f32, end_time: u64, end_value: f32) -> Self {
        Self {
            start_time,
            start_value,
            end_time,
            end_value,
        }
    }

    /// True while the ramp is still in motion at `time`.
    pub fn is_fading(&self, time: u64) -> bool {
        time >= self.start_time && time < self.end_time
    }

    /// Value at block timestamp `time`, clamped to the ramp's endpoints.
    pub fn value_at(&self, time: u64) -> f32 {
        if time <= self.start_time || self.end_time <= self.start_time {
            return if time >= self.end_time {
                self.end_value
            } else {
                self.start_value
            };
        }
        if time >= self.end_time {
            return self.end_value;
        }
        let span = (self.end_time - self.start_time) as f32;
        let progress = (time - self.start_time) as f32 / span;
        self.start_value + (self.end_value - self.start_value) * progress
    }
}

/// Per-sample gain evaluator for one block.
#[derive(Debug, Clone, Copy)]
pub struct BlockGain {
    start: f32,
    step: f32,
}

impl BlockGain {
    #[inline]
    pub fn at(&self, sample: usize) -> f32 {
        self.start + self.step * sample as f32
    }

    pub fn constant(value: f32) -> Self {
        Self {
            start: value,
            step: 0.0,
        }
    }
}

/// Splice-able gain ramp shared by generators, sources, effects, routes and
/// the context master gain.
///
/// Reconfiguring mid-ramp starts the new ramp from the current instantaneous
/// value, so chained changes stay click-free. A driver with a fade time of one
/// block gives every plain "set gain" an implicit one-block fade.
#[derive(Debug, Clone)]
pub struct FadeDriver {
    fader: LinearFader,
    fade_time_in_blocks: u32,
}

impl FadeDriver {
    pub fn new(start_value: f32, fade_time_in_blocks: u32) -> Self {
        Self {
            fader: LinearFader::constant(start_value),
            fade_time_in_blocks: fade_time_in_blocks.max(1),
        }
    }

    /// Begin a ramp from the current instantaneous value to `new_value`,
    /// completing after the driver's configured fade time.
    pub fn set_value(&mut self, time_in_blocks: u64, new_value: f32) {
        self.set_value_over(time_in_blocks, new_value, self.fade_time_in_blocks);
    }

    /// Like [`set_value`](Self::set_value) with an explicit duration.
    pub fn set_value_over(&mut self, time_in_blocks: u64, new_value: f32, blocks: u32) {
        let current = self.fader.value_at(time_in_blocks);
        self.fader = LinearFader::new(
            time_in_blocks,
            current,
            time_in_blocks + blocks.max(1) as u64,
            new_value,
        );
    }

    /// Value at the start of block `time_in_blocks`.
    pub fn value_at(&self, time_in_blocks: u64) -> f32 {
        self.fader.value_at(time_in_blocks)
    }

    /// Hand `callback` a per-sample gain evaluator for the block starting at
    /// `time_in_blocks`.
    pub fn drive<R>(&self, time_in_blocks: u64, callback: impl FnOnce(BlockGain) -> R) -> R {
        if self.fader.is_fading(time_in_blocks) {
            let start = self.fader.value_at(time_in_blocks);
            let end = self.fader.value_at(time_in_blocks + 1);
            callback(BlockGain {
                start,
                step: (end - start) / BLOCK_SIZE as f32,
            })
        } else {
            callback(BlockGain::constant(self.fader.value_at(time_in_blocks)))
        }
    }

    /// True if the block at `time_in_blocks` is still fading or sits above
    /// `threshold`. Used by fade-out bookkeeping to decide when a faded thing
    /// has actually gone quiet.
    pub fn is_active_at_time(&self, time_in_blocks: u64, threshold: f32) -> bool {
        self.fader.is_fading(time_in_blocks)
            || self.fader.value_at(time_in_blocks) > threshold
            || self.fader.value_at(time_in_blocks + 1) > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_constant_fader() {
        let fader = LinearFader::constant(0.5);
        assert!(!fader.is_fading(0));
        assert!(!fader.is_fading(100));
        assert_eq!(fader.value_at(0), 0.5);
        assert_eq!(fader.value_at(1000), 0.5);
    }

    #[test]
    fn test_fader_interpolates() {
        let fader = LinearFader::new(10, 0.0, 14, 1.0);
        assert!(approx_eq(fader.value_at(10), 0.0));
        assert!(approx_eq(fader.value_at(12), 0.5));
        assert!(approx_eq(fader.value_at(14), 1.0));
        assert!(approx_eq(fader.value_at(20), 1.0));
        assert!(approx_eq(fader.value_at(5), 0.0));
    }

    #[test]
    fn test_driver_one_block_fade() {
        let mut driver = FadeDriver::new(1.0, 1);
        driver.set_value(10, 0.0);
        driver.drive(10, |gain| {
            assert!(approx_eq(gain.at(0), 1.0));
            assert!(gain.at(BLOCK_SIZE - 1) < 0.01);
        });
        driver.drive(11, |gain| {
            assert!(approx_eq(gain.at(0), 0.0));
            assert!(approx_eq(gain.at(BLOCK_SIZE - 1), 0.0));
        });
    }

    #[test]
    fn test_driver_splices_from_current_value() {
        let mut driver = FadeDriver::new(0.0, 4);
        driver.set_value(0, 1.0);
        // Halfway through the ramp, retarget back to 0.
        assert!(approx_eq(driver.value_at(2), 0.5));
        driver.set_value(2, 0.0);
        assert!(approx_eq(driver.value_at(2), 0.5));
        assert!(approx_eq(driver.value_at(4), 0.25));
        assert!(approx_eq(driver.value_at(6), 0.0));
    }

    #[test]
    fn test_drive_is_continuous_across_blocks() {
        let mut driver = FadeDriver::new(0.0, 3);
        driver.set_value(0, 1.0);
        let mut previous_end = None;
        for block in 0..5u64 {
            driver.drive(block, |gain| {
                if let Some(prev) = previous_end {
                    let jump: f32 = gain.at(0) - prev;
                    assert!(jump.abs() <= 1.5 / BLOCK_SIZE as f32, "jump {jump}");
                }
                previous_end = Some(gain.at(BLOCK_SIZE - 1));
            });
        }
        assert!(approx_eq(driver.value_at(5), 1.0));
    }

    #[test]
    fn test_is_active_at_time() {
        let mut driver = FadeDriver::new(1.0, 2);
        driver.set_value(0, 0.0);
        assert!(driver.is_active_at_time(0, 0.0));
        assert!(driver.is_active_at_time(1, 0.0));
        assert!(!driver.is_active_at_time(3, 0.0));
    }
}
