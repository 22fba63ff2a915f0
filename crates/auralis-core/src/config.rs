//! Compile-time engine configuration.

/// Frames per audio block. Everything in the engine is block-synchronous.
pub const BLOCK_SIZE: usize = 512;

/// Engine sample rate. Decoders at other rates are resampled on the way in.
pub const SR: u32 = 44100;

/// Hard cap on generator/source channel counts.
pub const MAX_CHANNELS: usize = 16;

/// The master bus is stereo.
pub const MASTER_CHANNELS: usize = 2;

/// Depth of the streaming generator's decoded-audio ring, in blocks.
/// Sized for roughly 100 ms of latency.
pub const STREAMING_RING_BLOCKS: usize = (SR as usize / 10).div_ceil(BLOCK_SIZE);

/// Upper bound on commands drained per block, to cap worst-case work on the
/// audio thread.
pub const COMMANDS_PER_BLOCK: usize = 128;

/// Capacity of a context's control-to-audio command queue.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Longest supported echo tap delay.
pub const ECHO_MAX_DELAY_SECONDS: f64 = 5.0;

/// Longest supported reverb predelay.
pub const REVERB_MAX_PREDELAY_SECONDS: f64 = 0.5;

/// Chunk size for import-time buffer decoding.
pub const BUFFER_CHUNK_FRAMES: usize = 1024;

/// Convert a user-facing fade time in seconds to whole blocks, minimum 1.
pub fn fade_seconds_to_blocks(seconds: f64) -> u32 {
    let blocks = (seconds.max(0.0) * SR as f64 / BLOCK_SIZE as f64).ceil();
    (blocks as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_covers_100ms() {
        assert!(STREAMING_RING_BLOCKS * BLOCK_SIZE >= SR as usize / 10);
    }

    #[test]
    fn test_fade_conversion() {
        assert_eq!(fade_seconds_to_blocks(0.0), 1);
        assert_eq!(fade_seconds_to_blocks(-1.0), 1);
        // One block is 512/44100 s; anything below rounds up to 1.
        assert_eq!(fade_seconds_to_blocks(0.01), 1);
        assert_eq!(fade_seconds_to_blocks(0.03), 3);
        assert_eq!(fade_seconds_to_blocks(1.0), 87);
    }
}
