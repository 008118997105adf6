//! Integration tests for the cellsynth engine
//!
//! Exercises the driver, the exchange and the audio consumer together on the
//! CPU kernels, including the threaded setup the player uses.

use std::time::{Duration, Instant};

use crate::audio::{AudioConsumer, PollOutcome, UnderflowState};
use crate::driver::{SimulationDriver, StepOutcome};
use crate::error::{EngineError, SinkError};
use crate::grid::{BufferSlot, GridShape};
use crate::kernels::{ComputeKernelSet, CpuKernels, KernelLayout};
use crate::queue::MAX_BUFFERED_SECONDS;
use crate::reduction::ReductionTree;
use crate::rules::{AutomatonTables, ColorTable, FrequencyTable, RuleTensor};
use crate::shutdown::ShutdownSignal;
use crate::test_utils::{RecordingSink, config, cpu_setup};
use crate::worker::spawn_worker;

// ============================================================================
// Reduction tree
// ============================================================================

#[test]
fn test_reduction_terminates_for_all_power_of_two_shapes() {
    for n in [1usize, 2, 4, 8, 16, 32, 64] {
        let cells = n * n;
        let mut rf = 1;
        while rf <= cells {
            let tree = ReductionTree::new(cells / rf);
            assert_eq!(tree.final_count(), 1, "n={n} rf={rf}");
            assert_eq!(
                tree.depth(),
                (cells / rf).trailing_zeros() as usize,
                "n={n} rf={rf}"
            );
            rf *= 2;
        }
    }
}

#[test]
fn test_reduced_chunk_sums_all_partials() {
    for (n, m, rf) in [(4, 1, 1), (4, 2, 4), (8, 4, 2), (8, 1, 64)] {
        let layout = KernelLayout {
            shape: GridShape::square(n, m),
            reduction_factor: rf,
            samples_per_tick: 16,
            sample_rate: 1024,
        };
        let tables = AutomatonTables {
            rules: RuleTensor::zeros(m),
            colors: ColorTable::new(vec![[1.0; 4]; m]),
            frequencies: FrequencyTable::new(vec![0.0; m]),
        };
        let state: Vec<f32> = (0..layout.shape.len())
            .map(|i| if i % 3 == 0 { 1.0 } else { 0.0 })
            .collect();
        let mean = state.iter().sum::<f32>() / state.len() as f32;

        // 0 Hz at t = 0 is sin(0) for every sample
        let mut kernels = CpuKernels::new(layout, tables, &state).unwrap();
        let tree = ReductionTree::new(layout.groups());
        kernels
            .render_audio(BufferSlot::A, 0.0, tree.input_slot())
            .unwrap();
        tree.run(&mut kernels).unwrap();
        let mut chunk = vec![0.0; 16];
        kernels.read_audio(tree.result_slot(), &mut chunk).unwrap();
        assert!(chunk.iter().all(|s| s.abs() < 1e-6), "n={n} m={m} rf={rf}");

        // 0.25 Hz at t = 1 puts sample 0 at the peak, so it equals the mean
        let mut kernels = CpuKernels::new(
            layout,
            AutomatonTables {
                rules: RuleTensor::zeros(m),
                colors: ColorTable::new(vec![[1.0; 4]; m]),
                frequencies: FrequencyTable::new(vec![0.25; m]),
            },
            &state,
        )
        .unwrap();
        kernels
            .render_audio(BufferSlot::A, 1.0, tree.input_slot())
            .unwrap();
        tree.run(&mut kernels).unwrap();
        kernels.read_audio(tree.result_slot(), &mut chunk).unwrap();
        assert!(
            (chunk[0] - mean).abs() < 1e-4,
            "n={n} m={m} rf={rf}: {} vs {mean}",
            chunk[0]
        );
    }
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn test_reference_tick_shape() {
    let (kernels, exchange) = cpu_setup(&config(16, 4, 16, 1024, 44_100));
    let mut driver = SimulationDriver::new(kernels, exchange.clone(), ShutdownSignal::new()).unwrap();
    assert_eq!(driver.reduction().depth(), 4);

    assert_eq!(driver.step().unwrap(), StepOutcome::Ticked);
    assert_eq!(exchange.queue_depth().0, 1);
    let chunk = exchange.dequeue_audio().unwrap();
    assert_eq!(chunk.samples.len(), 1024);
    assert!(chunk.samples.iter().all(|s| s.abs() <= 1.0));

    let mut frame = Vec::new();
    exchange.read_texture(&mut frame, 0).unwrap();
    assert_eq!(frame.len(), 16 * 16 * 4);
    // Seed cell is fully on layer 0 (red)
    assert_eq!(&frame[0..4], &[255, 0, 0, 255]);
    assert!((driver.t() - 1024.0 / 44_100.0).abs() < 1e-15);
}

#[test]
fn test_queue_never_exceeds_ceiling_under_free_running_driver() {
    let (kernels, exchange) = cpu_setup(&config(4, 2, 1, 1024, 44_100));
    let mut driver = SimulationDriver::new(kernels, exchange.clone(), ShutdownSignal::new()).unwrap();

    let mut ticked = 0;
    for _ in 0..100 {
        if driver.step().unwrap() == StepOutcome::Ticked {
            ticked += 1;
        }
        assert!(exchange.queue_depth().1 <= MAX_BUFFERED_SECONDS);
    }
    assert_eq!(ticked, 21);
    assert_eq!(driver.backpressure_idles(), 79);
}

#[test]
fn test_underflow_notice_is_edge_triggered() {
    let (kernels, exchange) = cpu_setup(&config(4, 1, 1, 64, 44_100));
    let mut driver = SimulationDriver::new(kernels, exchange.clone(), ShutdownSignal::new()).unwrap();
    let mut consumer =
        AudioConsumer::new(RecordingSink::new(44_100), exchange, ShutdownSignal::new());

    // Empty at startup: silent
    assert_eq!(consumer.state(), UnderflowState::Warned);
    assert_eq!(consumer.poll_once().unwrap(), PollOutcome::Empty);
    assert_eq!(consumer.underflow_notices(), 0);

    driver.step().unwrap();
    assert_eq!(consumer.poll_once().unwrap(), PollOutcome::Played);
    assert_eq!(consumer.state(), UnderflowState::NotWarned);

    // Non-empty to empty: exactly one notice, however often it is polled
    for _ in 0..5 {
        assert_eq!(consumer.poll_once().unwrap(), PollOutcome::Empty);
    }
    assert_eq!(consumer.underflow_notices(), 1);

    driver.step().unwrap();
    consumer.poll_once().unwrap();
    consumer.poll_once().unwrap();
    assert_eq!(consumer.underflow_notices(), 2);
}

#[test]
fn test_threaded_pipeline_delivers_contiguous_chunks() {
    let shutdown = ShutdownSignal::new();
    let (kernels, exchange) = cpu_setup(&config(8, 2, 4, 256, 44_100));
    let mut driver = SimulationDriver::new(kernels, exchange.clone(), shutdown.clone()).unwrap();

    let sink = RecordingSink::new(44_100);
    let recorded = sink.recorded();
    let mut consumer = AudioConsumer::new(sink, exchange, shutdown.clone());

    let driver_handle = spawn_worker("sim-driver", shutdown.clone(), move || driver.run()).unwrap();
    let audio_handle = spawn_worker("audio-out", shutdown.clone(), move || consumer.run()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while recorded.lock().unwrap().len() < 256 * 8 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    shutdown.request();

    assert!(driver_handle.join().unwrap().is_ok());
    assert!(audio_handle.join().unwrap().is_ok());

    let recorded = recorded.lock().unwrap();
    assert!(recorded.len() >= 256 * 8);
    assert_eq!(recorded.len() % 256, 0);
}

#[test]
fn test_sink_failure_shuts_down_driver() {
    let shutdown = ShutdownSignal::new();
    let (kernels, exchange) = cpu_setup(&config(4, 1, 1, 64, 44_100));
    let mut driver = SimulationDriver::new(kernels, exchange.clone(), shutdown.clone()).unwrap();

    let sink = RecordingSink::new(44_100);
    sink.fail_writes();
    let mut consumer = AudioConsumer::new(sink, exchange, shutdown.clone());

    let driver_handle = spawn_worker("sim-driver", shutdown.clone(), move || driver.run()).unwrap();
    let audio_handle = spawn_worker("audio-out", shutdown.clone(), move || consumer.run()).unwrap();

    let audio_result = audio_handle.join().unwrap();
    assert!(matches!(
        audio_result,
        Err(EngineError::Sink(SinkError::Device(_)))
    ));
    assert!(shutdown.is_requested());
    assert!(driver_handle.join().unwrap().is_ok());
}
