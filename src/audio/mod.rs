//! Audio assembly.
//!
//! Segment buffers are reconciled to one sample rate and channel layout,
//! then spliced in script order with a linear crossfade, or with a fixed
//! silence gap when the crossfade is shorter than one frame.

pub mod assembler;
pub mod resample;
pub mod track;

use std::time::Duration;

pub use assembler::{assemble, Assembler, AssemblerConfig, AssemblerConfigBuilder};
pub use track::{AssembledTrack, SegmentTiming};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Exact duration of `frames` at `sample_rate`, truncated to nanoseconds.
pub fn frames_to_duration(frames: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = frames as u128 * NANOS_PER_SEC / sample_rate as u128;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Number of whole frames covered by `duration` at `sample_rate`.
pub fn duration_to_frames(duration: Duration, sample_rate: u32) -> usize {
    let frames = duration.as_nanos() * sample_rate as u128 / NANOS_PER_SEC;
    usize::try_from(frames).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_between_frames_and_durations() {
        assert_eq!(duration_to_frames(Duration::from_millis(50), 24_000), 1_200);
        assert_eq!(duration_to_frames(Duration::from_millis(150), 24_000), 3_600);
        assert_eq!(duration_to_frames(Duration::ZERO, 24_000), 0);
        assert_eq!(frames_to_duration(51_600, 24_000), Duration::from_millis(2_150));
        assert_eq!(frames_to_duration(100, 0), Duration::ZERO);
    }
}
