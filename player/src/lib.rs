//! cellsynth player
//!
//! Device-facing half of cellsynth: the wgpu compute kernels, the cpal
//! audio sink and the egui viewer, wired to the engine in `cellsynth-core`.

pub mod app;
pub mod audio;
pub mod gpu;
pub mod gui;

pub use app::{RunOptions, create_kernels, run};
pub use audio::{CpalOutput, CpalWriter};
pub use gpu::GpuKernels;
