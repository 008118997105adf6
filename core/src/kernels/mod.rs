//! # Compute kernels
//!
//! The [`ComputeKernelSet`] trait abstracts the four per-tick dispatches
//! over buffers the backend owns. Callers name buffers by [`BufferSlot`]:
//! grid slots address the state pair, scratch slots address the audio
//! reduction pair. Dispatches may complete asynchronously; results are only
//! guaranteed visible after [`ComputeKernelSet::synchronize`].
//!
//! [`CpuKernels`] is the deterministic reference backend. The wgpu backend
//! lives in the player crate.

mod cpu;

pub use cpu::CpuKernels;

use crate::error::KernelError;
use crate::grid::{BufferSlot, GridShape};

/// Buffer sizes and dispatch extents shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelLayout {
    pub shape: GridShape,
    /// Cells summed by one render work item.
    pub reduction_factor: usize,
    pub samples_per_tick: usize,
    pub sample_rate: u32,
}

impl KernelLayout {
    /// Render work groups per sample.
    pub fn groups(&self) -> usize {
        self.shape.cells() / self.reduction_factor
    }

    /// Length of each reduction scratch buffer, in samples.
    pub fn partial_len(&self) -> usize {
        self.groups() * self.samples_per_tick
    }

    /// Playback time covered by one tick.
    pub fn chunk_seconds(&self) -> f64 {
        self.samples_per_tick as f64 / self.sample_rate as f64
    }

    pub fn texture_len(&self) -> usize {
        self.shape.texture_len()
    }

    /// Check a `reduce` call against the scratch buffer size.
    pub fn check_reduce(&self, element_count: usize, factor: usize) -> Result<(), KernelError> {
        if factor == 0 || element_count % factor != 0 {
            return Err(KernelError::UnsupportedShape {
                kernel: "reduce",
                invocations: element_count as u64,
                reason: format!("{element_count} elements do not split into groups of {factor}"),
            });
        }
        if element_count > self.groups() {
            return Err(KernelError::SizeMismatch {
                what: "reduce input",
                expected: self.groups(),
                actual: element_count,
            });
        }
        Ok(())
    }
}

/// The four automaton kernels plus synchronization and readback.
pub trait ComputeKernelSet: Send {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    fn layout(&self) -> &KernelLayout;

    /// Next grid state from `input` into `output`.
    fn advance(&mut self, input: BufferSlot, output: BufferSlot) -> Result<(), KernelError>;

    /// RGBA8 texture of grid `state` into the backend's texture buffer.
    fn visualize(&mut self, state: BufferSlot) -> Result<(), KernelError>;

    /// Per-group partial audio of grid `state` at time `t` into scratch `output`.
    fn render_audio(
        &mut self,
        state: BufferSlot,
        t: f64,
        output: BufferSlot,
    ) -> Result<(), KernelError>;

    /// Sum each run of `factor` elements of scratch `input` into scratch `output`.
    fn reduce(
        &mut self,
        input: BufferSlot,
        output: BufferSlot,
        element_count: usize,
        factor: usize,
    ) -> Result<(), KernelError>;

    /// Block until every dispatch issued so far has completed.
    fn synchronize(&mut self) -> Result<(), KernelError>;

    /// Copy the texture buffer into `out` (`texture_len` bytes).
    fn read_texture(&mut self, out: &mut [u8]) -> Result<(), KernelError>;

    /// Copy the first `samples_per_tick` samples of scratch `slot` into `out`.
    fn read_audio(&mut self, slot: BufferSlot, out: &mut [f32]) -> Result<(), KernelError>;

    /// Copy grid buffer `slot` into `out`.
    fn read_state(&mut self, slot: BufferSlot, out: &mut [f32]) -> Result<(), KernelError>;

    /// Overwrite grid buffer `slot` with `data`.
    fn write_state(&mut self, slot: BufferSlot, data: &[f32]) -> Result<(), KernelError>;
}

/// Reject a buffer whose length differs from what the layout expects.
pub fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), KernelError> {
    if expected == actual {
        Ok(())
    } else {
        Err(KernelError::SizeMismatch {
            what,
            expected,
            actual,
        })
    }
}

/// Reject a dispatch that would read and write the same buffer.
pub fn check_disjoint(
    kernel: &'static str,
    input: BufferSlot,
    output: BufferSlot,
) -> Result<(), KernelError> {
    if input == output {
        return Err(KernelError::UnsupportedShape {
            kernel,
            invocations: 0,
            reason: format!("input and output both bound to slot {input:?}"),
        });
    }
    Ok(())
}

/// `sin(2π · (phase + hz · s / rate))` for every sample of one tick.
///
/// `phase` is the oscillator phase at the first sample, already reduced to
/// `[0, 1)`. Both backends evaluate exactly this expression in `f32`.
pub fn oscillator(phase: f32, hz: f32, sample: usize, sample_rate: u32) -> f32 {
    let cycles = phase + hz * (sample as f32 / sample_rate as f32);
    (std::f32::consts::TAU * cycles).sin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> KernelLayout {
        KernelLayout {
            shape: GridShape::square(16, 4),
            reduction_factor: 16,
            samples_per_tick: 1024,
            sample_rate: 44_100,
        }
    }

    #[test]
    fn test_layout_sizes() {
        let layout = layout();
        assert_eq!(layout.groups(), 16);
        assert_eq!(layout.partial_len(), 16 * 1024);
        assert_eq!(layout.texture_len(), 16 * 16 * 4);
        assert!((layout.chunk_seconds() - 1024.0 / 44_100.0).abs() < 1e-12);
    }

    #[test]
    fn test_check_reduce() {
        let layout = layout();
        assert!(layout.check_reduce(16, 2).is_ok());
        assert!(layout.check_reduce(3, 2).is_err());
        assert!(layout.check_reduce(32, 2).is_err());
        assert!(layout.check_reduce(4, 0).is_err());
    }

    #[test]
    fn test_oscillator_quarter_phase() {
        assert!((oscillator(0.25, 0.0, 0, 44_100) - 1.0).abs() < 1e-6);
        assert!(oscillator(0.0, 0.0, 100, 44_100).abs() < 1e-6);
        // 400 Hz at 1600 Hz sample rate: sample 1 is a quarter cycle in
        assert!((oscillator(0.0, 400.0, 1, 1600) - 1.0).abs() < 1e-6);
    }
}
