//! Audio output through cpal
//!
//! The engine produces mono `f32` chunks. [`CpalWriter`] fans them out to
//! every device channel and pushes them into a lock-free ring buffer that the
//! cpal callback drains. The cpal stream itself is not `Send`, so it stays in
//! [`CpalOutput`] on the thread that opened it while the writer moves to the
//! audio consumer thread.

mod output;

pub use output::{CpalOutput, CpalWriter};

use std::time::Duration;

/// Seconds of interleaved audio the ring buffer holds.
pub const RING_SECONDS: usize = 2;

/// Convert a sample to signed 16-bit, clamping out-of-range input.
pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Convert a sample to unsigned 16-bit, where 32768 is silence.
pub(crate) fn f32_to_u16(sample: f32) -> u16 {
    (sample * 32767.0 + 32768.0).clamp(0.0, 65535.0) as u16
}

/// Interleave mono `samples` into `out`, one copy per channel.
pub(crate) fn fan_out(samples: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    out.reserve(samples.len() * channels);
    for &sample in samples {
        out.extend(std::iter::repeat_n(sample, channels));
    }
}

/// Playback time represented by `queued` interleaved samples.
pub(crate) fn queued_duration(queued: usize, channels: usize, sample_rate: u32) -> Duration {
    let frames = queued / channels.max(1);
    Duration::from_secs_f64(frames as f64 / sample_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_conversions_clamp() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-2.0), -32768);
        assert_eq!(f32_to_u16(0.0), 32768);
        assert_eq!(f32_to_u16(2.0), 65535);
        assert_eq!(f32_to_u16(-2.0), 0);
    }

    #[test]
    fn test_fan_out_duplicates_each_sample() {
        let mut out = vec![9.0];
        fan_out(&[0.1, 0.2], 3, &mut out);
        assert_eq!(out, vec![0.1, 0.1, 0.1, 0.2, 0.2, 0.2]);

        fan_out(&[0.5], 1, &mut out);
        assert_eq!(out, vec![0.5]);
    }

    #[test]
    fn test_queued_duration_counts_frames() {
        assert_eq!(queued_duration(88_200, 2, 44_100), Duration::from_secs(1));
        assert_eq!(queued_duration(0, 2, 44_100), Duration::ZERO);
        assert_eq!(queued_duration(22_050, 1, 44_100), Duration::from_millis(500));
    }
}
