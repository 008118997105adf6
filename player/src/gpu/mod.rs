//! # GPU Kernels
//!
//! wgpu implementation of [`ComputeKernelSet`].
//!
//! Dispatches are recorded into one command encoder per tick and submitted
//! by [`synchronize`](ComputeKernelSet::synchronize). Readbacks copy into
//! host-mappable staging buffers and block on the device.
//!
//! Bind groups for both ping-pong directions are built at startup; reduction
//! steps get their own uniform block and bind group the first time a
//! `(input, element_count, factor)` combination is dispatched.

mod pipelines;
mod shaders;

#[cfg(test)]
mod tests;

use std::sync::mpsc;

use cellsynth_core::kernels::{check_disjoint, check_len};
use cellsynth_core::rules::FrequencyTable;
use cellsynth_core::{AutomatonTables, BufferSlot, ComputeKernelSet, KernelError, KernelLayout};
use hashbrown::HashMap;
use tracing::{debug, info};

use pipelines::{
    ADVANCE_BINDINGS, GridUniforms, Kernel, REDUCE_BINDINGS, RENDER_BINDINGS, ReduceUniforms,
    RenderUniforms, VISUALIZE_BINDINGS, bind_group, create_kernel, dispatch_size, record_pass,
    staging_buffer, storage_buffer, storage_buffer_init, uniform_buffer,
};

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Cache key for a reduction step's bind group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ReduceKey {
    input: BufferSlot,
    element_count: usize,
    factor: usize,
}

struct Kernels {
    advance: Kernel,
    visualize: Kernel,
    render: Kernel,
    reduce: Kernel,
}

struct Staging {
    texture: wgpu::Buffer,
    audio: wgpu::Buffer,
    state: wgpu::Buffer,
}

/// Compute kernels running on a wgpu device.
pub struct GpuKernels {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    layout: KernelLayout,
    max_workgroups: u32,
    frequencies: FrequencyTable,

    grid: [wgpu::Buffer; 2],
    scratch: [wgpu::Buffer; 2],
    pixels: wgpu::Buffer,
    phases: wgpu::Buffer,
    staging: Staging,

    kernels: Kernels,
    /// Indexed by input slot; output is always the other slot.
    advance_groups: [wgpu::BindGroup; 2],
    /// Indexed by state slot.
    visualize_groups: [wgpu::BindGroup; 2],
    /// Keyed by (state slot, scratch output slot).
    render_groups: HashMap<(BufferSlot, BufferSlot), wgpu::BindGroup>,
    reduce_groups: HashMap<ReduceKey, (wgpu::Buffer, wgpu::BindGroup)>,

    encoder: Option<wgpu::CommandEncoder>,
}

impl GpuKernels {
    /// Open the default adapter, build every kernel and upload the tables
    /// and `initial_state` (into grid slot A).
    pub fn new(
        layout: KernelLayout,
        tables: &AutomatonTables,
        initial_state: &[f32],
    ) -> Result<Self, KernelError> {
        let shape = layout.shape;
        check_len("rule table layers", shape.layers, tables.layers())?;
        check_len("initial state", shape.len(), initial_state.len())?;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| KernelError::NoAdapter(e.to_string()))?;

        let adapter_info = adapter.get_info();
        info!(
            "GPU adapter: {} ({:?}, {:?})",
            adapter_info.name, adapter_info.backend, adapter_info.device_type
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("cellsynth Compute Device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: Default::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| KernelError::Device(e.to_string()))?;

        let limits = device.limits();
        let max_workgroups = limits.max_compute_workgroups_per_dimension;

        let state_bytes = shape.len() as u64 * F32_BYTES;
        let partial_bytes = layout.partial_len() as u64 * F32_BYTES;
        let max_binding = limits.max_storage_buffer_binding_size as u64;
        for (kernel, bytes) in [("advance", state_bytes), ("render", partial_bytes)] {
            if bytes > max_binding {
                return Err(KernelError::UnsupportedShape {
                    kernel,
                    invocations: bytes / F32_BYTES,
                    reason: format!("{bytes} byte buffer exceeds the {max_binding} byte binding limit"),
                });
            }
        }

        // Fail at startup rather than on the first tick
        dispatch_size("advance", shape.len() as u64, max_workgroups)?;
        dispatch_size("visualize", shape.cells() as u64, max_workgroups)?;
        dispatch_size("render", layout.partial_len() as u64, max_workgroups)?;
        dispatch_size("reduce", layout.partial_len() as u64 / 2, max_workgroups)?;

        let kernels = Kernels {
            advance: create_kernel(&device, "advance", shaders::ADVANCE, ADVANCE_BINDINGS)?,
            visualize: create_kernel(&device, "visualize", shaders::VISUALIZE, VISUALIZE_BINDINGS)?,
            render: create_kernel(&device, "render", shaders::RENDER, RENDER_BINDINGS)?,
            reduce: create_kernel(&device, "reduce", shaders::REDUCE, REDUCE_BINDINGS)?,
        };

        let grid = [
            storage_buffer_init(&device, "Grid A", bytemuck::cast_slice(initial_state)),
            storage_buffer(&device, "Grid B", state_bytes),
        ];
        let scratch = [
            storage_buffer(&device, "Scratch A", partial_bytes),
            storage_buffer(&device, "Scratch B", partial_bytes),
        ];
        let pixels = storage_buffer(&device, "Pixels", layout.texture_len() as u64);
        let rules = storage_buffer_init(&device, "Rules", bytemuck::cast_slice(tables.rules.as_slice()));
        let colors = storage_buffer_init(
            &device,
            "Colors",
            bytemuck::cast_slice(&tables.colors.as_flat()),
        );
        let freqs = storage_buffer_init(
            &device,
            "Frequencies",
            bytemuck::cast_slice(tables.frequencies.as_slice()),
        );
        let phases = storage_buffer(&device, "Phases", shape.layers as u64 * F32_BYTES);

        let grid_uniforms = uniform_buffer(
            &device,
            "Grid Uniforms",
            &GridUniforms {
                width: shape.width as u32,
                height: shape.height as u32,
                layers: shape.layers as u32,
                total: shape.len() as u32,
            },
        );
        let render_uniforms = uniform_buffer(
            &device,
            "Render Uniforms",
            &RenderUniforms {
                cells: shape.cells() as u32,
                layers: shape.layers as u32,
                group_size: layout.reduction_factor as u32,
                samples: layout.samples_per_tick as u32,
                total: layout.partial_len() as u32,
                sample_rate: layout.sample_rate as f32,
                norm: 1.0 / shape.len() as f32,
                _pad: 0,
            },
        );

        let advance_groups = [BufferSlot::A, BufferSlot::B].map(|input| {
            bind_group(
                &device,
                &kernels.advance,
                "Advance Bind Group",
                &[
                    &grid_uniforms,
                    &rules,
                    &grid[input.index()],
                    &grid[input.other().index()],
                ],
            )
        });
        let visualize_groups = [BufferSlot::A, BufferSlot::B].map(|state| {
            bind_group(
                &device,
                &kernels.visualize,
                "Visualize Bind Group",
                &[&grid_uniforms, &colors, &grid[state.index()], &pixels],
            )
        });

        let mut render_groups = HashMap::new();
        for state in [BufferSlot::A, BufferSlot::B] {
            for output in [BufferSlot::A, BufferSlot::B] {
                let group = bind_group(
                    &device,
                    &kernels.render,
                    "Render Bind Group",
                    &[
                        &render_uniforms,
                        &freqs,
                        &phases,
                        &grid[state.index()],
                        &scratch[output.index()],
                    ],
                );
                render_groups.insert((state, output), group);
            }
        }

        let staging = Staging {
            texture: staging_buffer(&device, "Texture Staging", layout.texture_len() as u64),
            audio: staging_buffer(
                &device,
                "Audio Staging",
                layout.samples_per_tick as u64 * F32_BYTES,
            ),
            state: staging_buffer(&device, "State Staging", state_bytes),
        };

        debug!(
            "GPU kernels ready: {} state bytes, {} scratch bytes per buffer",
            state_bytes, partial_bytes
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
            layout,
            max_workgroups,
            frequencies: tables.frequencies.clone(),
            grid,
            scratch,
            pixels,
            phases,
            staging,
            kernels,
            advance_groups,
            visualize_groups,
            render_groups,
            reduce_groups: HashMap::new(),
            encoder: None,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        self.encoder.take().unwrap_or_else(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("cellsynth Tick Encoder"),
                })
        })
    }

    /// Submit recorded dispatches without waiting for them.
    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Copy `size` bytes of `source` into `out` through `staging`.
    fn readback(
        &mut self,
        source: Source,
        size: u64,
        out: &mut [u8],
    ) -> Result<(), KernelError> {
        self.flush();

        let (buffer, staging) = match source {
            Source::Pixels => (&self.pixels, &self.staging.texture),
            Source::Scratch(slot) => (&self.scratch[slot.index()], &self.staging.audio),
            Source::Grid(slot) => (&self.grid[slot.index()], &self.staging.state),
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("cellsynth Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..size);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| KernelError::Sync(e.to_string()))?;

        rx.recv()
            .map_err(|e| KernelError::Readback(e.to_string()))?
            .map_err(|e| KernelError::Readback(e.to_string()))?;

        {
            let mapped = slice.get_mapped_range();
            out.copy_from_slice(&mapped);
        }
        staging.unmap();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Pixels,
    Scratch(BufferSlot),
    Grid(BufferSlot),
}

impl ComputeKernelSet for GpuKernels {
    fn name(&self) -> &str {
        "gpu"
    }

    fn layout(&self) -> &KernelLayout {
        &self.layout
    }

    fn advance(&mut self, input: BufferSlot, output: BufferSlot) -> Result<(), KernelError> {
        check_disjoint("advance", input, output)?;
        let size = dispatch_size("advance", self.layout.shape.len() as u64, self.max_workgroups)?;
        let mut encoder = self.take_encoder();
        record_pass(
            &mut encoder,
            &self.kernels.advance,
            &self.advance_groups[input.index()],
            size,
        );
        self.encoder = Some(encoder);
        Ok(())
    }

    fn visualize(&mut self, state: BufferSlot) -> Result<(), KernelError> {
        let size = dispatch_size(
            "visualize",
            self.layout.shape.cells() as u64,
            self.max_workgroups,
        )?;
        let mut encoder = self.take_encoder();
        record_pass(
            &mut encoder,
            &self.kernels.visualize,
            &self.visualize_groups[state.index()],
            size,
        );
        self.encoder = Some(encoder);
        Ok(())
    }

    /// Uploads the tick's oscillator phases before recording the dispatch.
    /// Only one render may be in flight per `synchronize`.
    fn render_audio(
        &mut self,
        state: BufferSlot,
        t: f64,
        output: BufferSlot,
    ) -> Result<(), KernelError> {
        let size = dispatch_size("render", self.layout.partial_len() as u64, self.max_workgroups)?;
        let phases = self.frequencies.phases_at(t);
        self.queue
            .write_buffer(&self.phases, 0, bytemuck::cast_slice(&phases));

        let mut encoder = self.take_encoder();
        let bind_group = &self.render_groups[&(state, output)];
        record_pass(&mut encoder, &self.kernels.render, bind_group, size);
        self.encoder = Some(encoder);
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
        let outputs = element_count / factor;
        let invocations = (outputs * samples) as u64;
        let size = dispatch_size("reduce", invocations, self.max_workgroups)?;

        let mut encoder = self.take_encoder();
        let Self {
            device,
            kernels,
            scratch,
            reduce_groups,
            ..
        } = &mut *self;
        let key = ReduceKey {
            input,
            element_count,
            factor,
        };
        let (_, bind_group) = reduce_groups.entry(key).or_insert_with(|| {
            debug!("Creating reduce bind group for {key:?}");
            let uniforms = uniform_buffer(
                device,
                "Reduce Uniforms",
                &ReduceUniforms {
                    outputs: outputs as u32,
                    factor: factor as u32,
                    samples: samples as u32,
                    total: invocations as u32,
                },
            );
            let group = bind_group(
                device,
                &kernels.reduce,
                "Reduce Bind Group",
                &[&uniforms, &scratch[input.index()], &scratch[output.index()]],
            );
            (uniforms, group)
        });
        record_pass(&mut encoder, &kernels.reduce, bind_group, size);
        self.encoder = Some(encoder);
        Ok(())
    }

    fn synchronize(&mut self) -> Result<(), KernelError> {
        self.flush();
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| KernelError::Sync(e.to_string()))?;
        Ok(())
    }

    fn read_texture(&mut self, out: &mut [u8]) -> Result<(), KernelError> {
        check_len("texture readback", self.layout.texture_len(), out.len())?;
        self.readback(Source::Pixels, out.len() as u64, out)
    }

    fn read_audio(&mut self, slot: BufferSlot, out: &mut [f32]) -> Result<(), KernelError> {
        check_len("audio readback", self.layout.samples_per_tick, out.len())?;
        let size = out.len() as u64 * F32_BYTES;
        self.readback(Source::Scratch(slot), size, bytemuck::cast_slice_mut(out))
    }

    fn read_state(&mut self, slot: BufferSlot, out: &mut [f32]) -> Result<(), KernelError> {
        check_len("state readback", self.layout.shape.len(), out.len())?;
        let size = out.len() as u64 * F32_BYTES;
        self.readback(Source::Grid(slot), size, bytemuck::cast_slice_mut(out))
    }

    fn write_state(&mut self, slot: BufferSlot, data: &[f32]) -> Result<(), KernelError> {
        check_len("state upload", self.layout.shape.len(), data.len())?;
        self.flush();
        self.queue
            .write_buffer(&self.grid[slot.index()], 0, bytemuck::cast_slice(data));
        Ok(())
    }
}
