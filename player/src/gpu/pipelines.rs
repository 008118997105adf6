//! GPU pipeline, buffer and bind group creation.
//!
//! Helpers used by [`GpuKernels`](super::GpuKernels) at startup. Every
//! kernel reads a small uniform block at binding 0 followed by storage
//! buffers, so layouts are built from the binding list alone.

use bytemuck::{Pod, Zeroable};
use cellsynth_core::KernelError;
use tracing::debug;
use wgpu::util::DeviceExt;

use super::shaders;

/// Invocations per workgroup; matches `@workgroup_size` in every kernel.
pub(super) const WORKGROUP_SIZE: u32 = 64;

/// Grid dimensions for `advance` and `visualize` (matches `Grid` in WGSL).
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub(super) struct GridUniforms {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    /// width * height * layers
    pub total: u32,
}

/// Synthesis parameters for `render` (matches `Render` in WGSL).
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub(super) struct RenderUniforms {
    pub cells: u32,
    pub layers: u32,
    pub group_size: u32,
    pub samples: u32,
    /// groups * samples
    pub total: u32,
    pub sample_rate: f32,
    pub norm: f32,
    pub _pad: u32,
}

/// One reduction step (matches `Reduce` in WGSL).
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub(super) struct ReduceUniforms {
    pub outputs: u32,
    pub factor: u32,
    pub samples: u32,
    /// outputs * samples
    pub total: u32,
}

/// Binding kinds, in binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Binding {
    Uniform,
    ReadOnly,
    ReadWrite,
}

pub(super) const ADVANCE_BINDINGS: &[Binding] = &[
    Binding::Uniform,
    Binding::ReadOnly,
    Binding::ReadOnly,
    Binding::ReadWrite,
];
pub(super) const VISUALIZE_BINDINGS: &[Binding] = ADVANCE_BINDINGS;
pub(super) const RENDER_BINDINGS: &[Binding] = &[
    Binding::Uniform,
    Binding::ReadOnly,
    Binding::ReadOnly,
    Binding::ReadOnly,
    Binding::ReadWrite,
];
pub(super) const REDUCE_BINDINGS: &[Binding] =
    &[Binding::Uniform, Binding::ReadOnly, Binding::ReadWrite];

/// A compute pipeline and the layout of its single bind group.
pub(super) struct Kernel {
    pub name: &'static str,
    pub pipeline: wgpu::ComputePipeline,
    pub layout: wgpu::BindGroupLayout,
}

/// Workgroup counts `(x, y)` covering `invocations` with linearised indexing.
///
/// Kernels recover their index as `gid.x + gid.y * num_workgroups.x * 64`
/// and skip anything past the end, so `x * y * 64` may overshoot.
pub(super) fn dispatch_size(
    kernel: &'static str,
    invocations: u64,
    max_per_dimension: u32,
) -> Result<(u32, u32), KernelError> {
    let groups = invocations.div_ceil(WORKGROUP_SIZE as u64).max(1);
    let x = groups.min(max_per_dimension as u64);
    let y = groups.div_ceil(x);
    if y > max_per_dimension as u64 {
        return Err(KernelError::UnsupportedShape {
            kernel,
            invocations,
            reason: format!(
                "needs {groups} workgroups, limit is {max_per_dimension} per dimension"
            ),
        });
    }
    Ok((x as u32, y as u32))
}

fn layout_entry(binding: u32, kind: Binding) -> wgpu::BindGroupLayoutEntry {
    let ty = match kind {
        Binding::Uniform => wgpu::BufferBindingType::Uniform,
        Binding::ReadOnly => wgpu::BufferBindingType::Storage { read_only: true },
        Binding::ReadWrite => wgpu::BufferBindingType::Storage { read_only: false },
    };
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Validate `source` and build its pipeline with entry point `name`.
pub(super) fn create_kernel(
    device: &wgpu::Device,
    name: &'static str,
    source: &str,
    bindings: &[Binding],
) -> Result<Kernel, KernelError> {
    shaders::validate(name, source)?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(name),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let entries: Vec<_> = bindings
        .iter()
        .enumerate()
        .map(|(i, &kind)| layout_entry(i as u32, kind))
        .collect();
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(name),
        entries: &entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(name),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(name),
        layout: Some(&pipeline_layout),
        module: &shader_module,
        entry_point: Some(name),
        compilation_options: Default::default(),
        cache: None,
    });

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(KernelError::Build {
            kernel: name,
            message: error.to_string(),
        });
    }

    debug!("Built compute kernel `{name}`");
    Ok(Kernel {
        name,
        pipeline,
        layout,
    })
}

/// Bind `buffers` to consecutive bindings of `kernel`'s layout.
pub(super) fn bind_group(
    device: &wgpu::Device,
    kernel: &Kernel,
    label: &str,
    buffers: &[&wgpu::Buffer],
) -> wgpu::BindGroup {
    let entries: Vec<_> = buffers
        .iter()
        .enumerate()
        .map(|(i, buffer)| wgpu::BindGroupEntry {
            binding: i as u32,
            resource: buffer.as_entire_binding(),
        })
        .collect();
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &kernel.layout,
        entries: &entries,
    })
}

/// Storage buffer of `size` bytes, zero-initialized.
pub(super) fn storage_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Storage buffer initialized with `contents`.
pub(super) fn storage_buffer_init(
    device: &wgpu::Device,
    label: &str,
    contents: &[u8],
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
    })
}

pub(super) fn uniform_buffer<T: Pod>(device: &wgpu::Device, label: &str, value: &T) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM,
    })
}

/// Host-mappable buffer for readback.
pub(super) fn staging_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Record one compute pass dispatching `kernel` with `bind_group`.
pub(super) fn record_pass(
    encoder: &mut wgpu::CommandEncoder,
    kernel: &Kernel,
    bind_group: &wgpu::BindGroup,
    (x, y): (u32, u32),
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(kernel.name),
        timestamp_writes: None,
    });
    pass.set_pipeline(&kernel.pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.dispatch_workgroups(x, y, 1);
}
