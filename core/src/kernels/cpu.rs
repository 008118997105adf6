//! # CPU Kernels
//!
//! Reference implementation of the four kernels using Rayon.
//!
//! Used for tests, for machines without a compatible GPU, and as the
//! fallback when `backend = "auto"` cannot open a device. Every kernel is a
//! pure function of its inputs, so repeated runs are bit-identical.

use rayon::prelude::*;

use super::{ComputeKernelSet, KernelLayout, check_disjoint, check_len, oscillator};
use crate::error::KernelError;
use crate::grid::{BufferSlot, split_pair};
use crate::rules::AutomatonTables;

/// Rayon-parallel kernel set over host memory.
pub struct CpuKernels {
    layout: KernelLayout,
    tables: AutomatonTables,
    grid: [Vec<f32>; 2],
    scratch: [Vec<f32>; 2],
    texture: Vec<u8>,
    /// Per-layer oscillator values for the tick being rendered, `layers x samples`.
    oscillators: Vec<f32>,
}

impl CpuKernels {
    /// Allocate every buffer and load `initial_state` into grid slot A.
    pub fn new(
        layout: KernelLayout,
        tables: AutomatonTables,
        initial_state: &[f32],
    ) -> Result<Self, KernelError> {
        let shape = layout.shape;
        check_len("rule table layers", shape.layers, tables.layers())?;
        check_len("initial state", shape.len(), initial_state.len())?;

        Ok(Self {
            grid: [initial_state.to_vec(), vec![0.0; shape.len()]],
            scratch: [vec![0.0; layout.partial_len()], vec![0.0; layout.partial_len()]],
            texture: vec![0; layout.texture_len()],
            oscillators: vec![0.0; shape.layers * layout.samples_per_tick],
            layout,
            tables,
        })
    }
}

/// Neighbour coordinate with toroidal wrap.
fn wrap(i: usize, d: i32, n: usize) -> usize {
    (i + n).wrapping_add_signed(d as isize) % n
}

impl ComputeKernelSet for CpuKernels {
    fn name(&self) -> &str {
        "cpu"
    }

    fn layout(&self) -> &KernelLayout {
        &self.layout
    }

    fn advance(&mut self, input: BufferSlot, output: BufferSlot) -> Result<(), KernelError> {
        check_disjoint("advance", input, output)?;
        let shape = self.layout.shape;
        let rules = &self.tables.rules;
        let (input, output) = split_pair(&mut self.grid, input, output);

        // One chunk per (layer, row); the layer is the target of every weight
        output
            .par_chunks_mut(shape.width)
            .enumerate()
            .for_each(|(row, out_row)| {
                let target = row / shape.height;
                let y = row % shape.height;
                for (x, out) in out_row.iter_mut().enumerate() {
                    let mut acc = rules.bias(target);
                    for dy in -1..=1 {
                        let ny = wrap(y, dy, shape.height);
                        for dx in -1..=1 {
                            let nx = wrap(x, dx, shape.width);
                            for source in 0..shape.layers {
                                acc += rules.neighbor(dx, dy, target, source)
                                    * input[shape.index(nx, ny, source)];
                            }
                        }
                    }
                    *out = acc.clamp(0.0, 1.0);
                }
            });
        Ok(())
    }

    fn visualize(&mut self, state: BufferSlot) -> Result<(), KernelError> {
        let shape = self.layout.shape;
        let cells = shape.cells();
        let colors = &self.tables.colors;
        let state = &self.grid[state.index()];

        self.texture
            .par_chunks_mut(4)
            .enumerate()
            .for_each(|(cell, pixel)| {
                let mut rgba = [0.0f32; 4];
                for layer in 0..shape.layers {
                    let value = state[layer * cells + cell];
                    let color = colors.color(layer);
                    for (channel, c) in rgba.iter_mut().zip(color) {
                        *channel += value * c;
                    }
                }
                for (byte, channel) in pixel.iter_mut().zip(rgba) {
                    *byte = (channel.clamp(0.0, 1.0) * 255.0).round() as u8;
                }
            });
        Ok(())
    }

    fn render_audio(
        &mut self,
        state: BufferSlot,
        t: f64,
        output: BufferSlot,
    ) -> Result<(), KernelError> {
        let layout = self.layout;
        let shape = layout.shape;
        let samples = layout.samples_per_tick;
        let cells = shape.cells();
        let group = layout.reduction_factor;

        let phases = self.tables.frequencies.phases_at(t);
        let hz = self.tables.frequencies.as_slice();
        for (layer, row) in self.oscillators.chunks_mut(samples).enumerate() {
            for (s, value) in row.iter_mut().enumerate() {
                *value = oscillator(phases[layer], hz[layer], s, layout.sample_rate);
            }
        }

        let norm = 1.0 / (cells * shape.layers) as f32;
        let state = &self.grid[state.index()];
        let oscillators = &self.oscillators;
        let partial = &mut self.scratch[output.index()][..layout.partial_len()];

        partial
            .par_chunks_mut(samples)
            .enumerate()
            .for_each(|(g, out)| {
                for (s, sample) in out.iter_mut().enumerate() {
                    let mut acc = 0.0f32;
                    for cell in g * group..(g + 1) * group {
                        for layer in 0..shape.layers {
                            acc += state[layer * cells + cell] * oscillators[layer * samples + s];
                        }
                    }
                    *sample = acc * norm;
                }
            });
        Ok(())
    }

    fn reduce(
        &mut self,
        input: BufferSlot,
        output: BufferSlot,
        element_count: usize,
        factor: usize,
    ) -> Result<(), KernelError> {
        check_disjoint("reduce", input, output)?;
        self.layout.check_reduce(element_count, factor)?;
        let samples = self.layout.samples_per_tick;
        let (input, output) = split_pair(&mut self.scratch, input, output);

        output[..element_count / factor * samples]
            .par_chunks_mut(samples)
            .enumerate()
            .for_each(|(i, out)| {
                for (s, sample) in out.iter_mut().enumerate() {
                    *sample = (0..factor)
                        .map(|k| input[(i * factor + k) * samples + s])
                        .sum();
                }
            });
        Ok(())
    }

    fn synchronize(&mut self) -> Result<(), KernelError> {
        Ok(())
    }

    fn read_texture(&mut self, out: &mut [u8]) -> Result<(), KernelError> {
        check_len("texture readback", self.texture.len(), out.len())?;
        out.copy_from_slice(&self.texture);
        Ok(())
    }

    fn read_audio(&mut self, slot: BufferSlot, out: &mut [f32]) -> Result<(), KernelError> {
        let samples = self.layout.samples_per_tick;
        check_len("audio readback", samples, out.len())?;
        out.copy_from_slice(&self.scratch[slot.index()][..samples]);
        Ok(())
    }

    fn read_state(&mut self, slot: BufferSlot, out: &mut [f32]) -> Result<(), KernelError> {
        let state = &self.grid[slot.index()];
        check_len("state readback", state.len(), out.len())?;
        out.copy_from_slice(state);
        Ok(())
    }

    fn write_state(&mut self, slot: BufferSlot, data: &[f32]) -> Result<(), KernelError> {
        let state = &mut self.grid[slot.index()];
        check_len("state upload", state.len(), data.len())?;
        state.copy_from_slice(data);
        Ok(())
    }
}
