//! Channel-count conversion.
//!
//! Mono and stereo convert with an equal-power law; everything else maps
//! channel-for-channel with the excess dropped or left silent. Conversions
//! are additive so callers can accumulate into shared mix buffers.

/// `1/sqrt(2)`, the equal-power gain for mono<->stereo conversion.
const EQUAL_POWER: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Mix one frame from `src` into `dst`, scaling by `gain`. Adds, never
/// overwrites.
#[inline]
pub fn mix_frame(src: &[f32], src_channels: usize, dst: &mut [f32], dst_channels: usize, gain: f32) {
    debug_assert!(src.len() >= src_channels);
    debug_assert!(dst.len() >= dst_channels);

    match (src_channels, dst_channels) {
        (1, 2) => {
            let s = src[0] * gain * EQUAL_POWER;
            dst[0] += s;
            dst[1] += s;
        }
        (2, 1) => {
            dst[0] += (src[0] + src[1]) * gain * EQUAL_POWER;
        }
        _ => {
            let n = src_channels.min(dst_channels);
            for ch in 0..n {
                dst[ch] += src[ch] * gain;
            }
        }
    }
}
