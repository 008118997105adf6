//! GPU kernel tests
//!
//! Shader validation and dispatch sizing run everywhere. Tests that need a
//! device compare against [`CpuKernels`] and return early when no adapter is
//! available.

use super::pipelines::{GridUniforms, ReduceUniforms, RenderUniforms, WORKGROUP_SIZE, dispatch_size};
use super::shaders::{KERNELS, validate};
use super::*;
use cellsynth_core::rules::seed_state;
use cellsynth_core::{CpuKernels, GridShape, ReductionTree};

#[test]
fn test_all_kernels_validate() {
    for (name, source) in KERNELS {
        let name: &'static str = name;
        if let Err(e) = validate(name, source) {
            panic!("{name} failed validation: {e}");
        }
    }
}

#[test]
fn test_validate_reports_missing_entry_point() {
    let err = validate("advance", shaders::REDUCE).unwrap_err();
    assert!(matches!(err, KernelError::Build { kernel: "advance", .. }));
}

#[test]
fn test_validate_reports_parse_errors() {
    let err = validate("broken", "@compute fn broken( {").unwrap_err();
    match err {
        KernelError::Build { kernel, message } => {
            assert_eq!(kernel, "broken");
            assert!(!message.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_uniform_layouts_match_wgsl() {
    assert_eq!(std::mem::size_of::<GridUniforms>(), 16);
    assert_eq!(std::mem::size_of::<RenderUniforms>(), 32);
    assert_eq!(std::mem::size_of::<ReduceUniforms>(), 16);
}

#[test]
fn test_dispatch_size_covers_invocations() {
    assert_eq!(dispatch_size("k", 1, 65_535).unwrap(), (1, 1));
    assert_eq!(dispatch_size("k", 64, 65_535).unwrap(), (1, 1));
    assert_eq!(dispatch_size("k", 100, 65_535).unwrap(), (2, 1));

    // Spills into y once x is saturated
    let (x, y) = dispatch_size("k", 1 << 24, 1024).unwrap();
    assert_eq!((x, y), (1024, 256));
    assert!(x as u64 * y as u64 * WORKGROUP_SIZE as u64 >= 1 << 24);

    let (x, y) = dispatch_size("k", 1024 * 64 + 1, 1024).unwrap();
    assert_eq!((x, y), (1024, 2));
}

#[test]
fn test_dispatch_size_rejects_oversized_grids() {
    let err = dispatch_size("advance", 1 << 40, 65_535).unwrap_err();
    assert!(matches!(
        err,
        KernelError::UnsupportedShape {
            kernel: "advance",
            ..
        }
    ));
}

fn layout(n: usize, m: usize, rf: usize, samples: usize) -> KernelLayout {
    KernelLayout {
        shape: GridShape::square(n, m),
        reduction_factor: rf,
        samples_per_tick: samples,
        sample_rate: 44_100,
    }
}

/// Both backends over the preset, or `None` without a usable adapter.
fn backends(layout: KernelLayout) -> Option<(GpuKernels, CpuKernels)> {
    let tables = AutomatonTables::preset(layout.shape.layers);
    let state = seed_state(layout.shape);
    let gpu = match GpuKernels::new(layout, &tables, &state) {
        Ok(gpu) => gpu,
        Err(KernelError::NoAdapter(reason)) => {
            eprintln!("skipping GPU test: {reason}");
            return None;
        }
        Err(e) => panic!("failed to create GPU kernels: {e}"),
    };
    let cpu = CpuKernels::new(layout, tables, &state).unwrap();
    Some((gpu, cpu))
}

fn assert_close(gpu: &[f32], cpu: &[f32], tolerance: f32, what: &str) {
    assert_eq!(gpu.len(), cpu.len());
    for (i, (g, c)) in gpu.iter().zip(cpu).enumerate() {
        assert!((g - c).abs() <= tolerance, "{what}[{i}]: gpu {g} cpu {c}");
    }
}

#[test]
fn test_gpu_tick_matches_cpu() {
    let layout = layout(16, 2, 4, 256);
    let Some((mut gpu, mut cpu)) = backends(layout) else {
        return;
    };
    let tree = ReductionTree::new(layout.groups());

    let mut slot = BufferSlot::A;
    let mut t = 0.0;
    for _ in 0..4 {
        let next = slot.other();
        for kernels in [&mut gpu as &mut dyn ComputeKernelSet, &mut cpu] {
            kernels.advance(slot, next).unwrap();
            kernels.visualize(next).unwrap();
            kernels.render_audio(next, t, tree.input_slot()).unwrap();
            tree.run(kernels).unwrap();
            kernels.synchronize().unwrap();
        }

        let mut gpu_state = vec![0.0; layout.shape.len()];
        let mut cpu_state = vec![0.0; layout.shape.len()];
        gpu.read_state(next, &mut gpu_state).unwrap();
        cpu.read_state(next, &mut cpu_state).unwrap();
        assert_close(&gpu_state, &cpu_state, 1e-5, "state");

        let mut gpu_audio = vec![0.0; 256];
        let mut cpu_audio = vec![0.0; 256];
        gpu.read_audio(tree.result_slot(), &mut gpu_audio).unwrap();
        cpu.read_audio(tree.result_slot(), &mut cpu_audio).unwrap();
        assert_close(&gpu_audio, &cpu_audio, 1e-4, "audio");

        let mut gpu_pixels = vec![0; layout.texture_len()];
        let mut cpu_pixels = vec![0; layout.texture_len()];
        gpu.read_texture(&mut gpu_pixels).unwrap();
        cpu.read_texture(&mut cpu_pixels).unwrap();
        for (g, c) in gpu_pixels.iter().zip(&cpu_pixels) {
            assert!(g.abs_diff(*c) <= 1, "pixel gpu {g} cpu {c}");
        }

        slot = next;
        t += layout.chunk_seconds();
    }
}

#[test]
fn test_gpu_write_state_round_trips() {
    let layout = layout(4, 2, 1, 64);
    let Some((mut gpu, _)) = backends(layout) else {
        return;
    };
    let data: Vec<f32> = (0..layout.shape.len()).map(|i| i as f32 / 32.0).collect();
    gpu.write_state(BufferSlot::B, &data).unwrap();
    let mut back = vec![0.0; data.len()];
    gpu.read_state(BufferSlot::B, &mut back).unwrap();
    assert_eq!(back, data);
}

#[test]
fn test_gpu_rejects_aliased_slots_and_bad_lengths() {
    let layout = layout(4, 1, 1, 64);
    let Some((mut gpu, _)) = backends(layout) else {
        return;
    };
    assert!(matches!(
        gpu.advance(BufferSlot::A, BufferSlot::A),
        Err(KernelError::UnsupportedShape { kernel: "advance", .. })
    ));
    assert!(matches!(
        gpu.read_audio(BufferSlot::A, &mut [0.0; 3]),
        Err(KernelError::SizeMismatch { .. })
    ));
}
