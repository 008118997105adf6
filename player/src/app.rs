//! Process orchestration
//!
//! Builds every component from a validated [`EngineConfig`], starts the
//! driver and audio threads, runs the viewer (or waits headless) on the
//! calling thread, then shuts everything down and collects thread results.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use cellsynth_core::rules::seed_state;
use cellsynth_core::{
    AudioChunkQueue, AudioConsumer, AutomatonTables, BackendChoice, ComputeKernelSet, CpuKernels,
    EngineConfig, EngineError, KernelError, KernelLayout, SharedExchange, ShutdownSignal,
    SimulationDriver, TextureSlot, spawn_worker,
};
use tracing::{info, warn};

use crate::audio::CpalOutput;
use crate::gpu::GpuKernels;
use crate::gui::{self, ViewerInfo};

/// Poll interval of the headless wait loop.
const HEADLESS_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip the viewer window.
    pub headless: bool,
    /// Request shutdown after this long.
    pub duration: Option<Duration>,
}

/// Build the kernel set for `choice`.
///
/// `Auto` falls back to the CPU kernels when the GPU cannot be used.
pub fn create_kernels(
    choice: BackendChoice,
    layout: KernelLayout,
    tables: AutomatonTables,
    initial_state: &[f32],
) -> Result<Box<dyn ComputeKernelSet>, KernelError> {
    match choice {
        BackendChoice::Cpu => Ok(Box::new(CpuKernels::new(layout, tables, initial_state)?)),
        BackendChoice::Gpu => Ok(Box::new(GpuKernels::new(layout, &tables, initial_state)?)),
        BackendChoice::Auto => match GpuKernels::new(layout, &tables, initial_state) {
            Ok(kernels) => Ok(Box::new(kernels)),
            Err(e) => {
                warn!("GPU backend unavailable ({}), falling back to CPU", e);
                Ok(Box::new(CpuKernels::new(layout, tables, initial_state)?))
            }
        },
    }
}

/// Block until shutdown is requested or `deadline` passes.
///
/// Returns true if the deadline ended the wait.
pub fn wait_for_shutdown(shutdown: &ShutdownSignal, deadline: Option<Instant>) -> bool {
    while !shutdown.is_requested() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return true;
        }
        thread::sleep(HEADLESS_POLL);
    }
    false
}

/// Request shutdown from a background thread once `deadline` passes.
fn spawn_deadline(
    shutdown: &ShutdownSignal,
    deadline: Instant,
) -> std::io::Result<JoinHandle<Result<(), EngineError>>> {
    let signal = shutdown.clone();
    spawn_worker("deadline", shutdown.clone(), move || {
        if wait_for_shutdown(&signal, Some(deadline)) {
            info!("Duration elapsed");
        }
        Ok(())
    })
}

fn join_worker(
    name: &str,
    handle: JoinHandle<Result<(), EngineError>>,
) -> Result<(), anyhow::Error> {
    match handle.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow::Error::new(e).context(format!("{name} thread failed"))),
        Err(_) => Err(anyhow!("{name} thread panicked")),
    }
}

/// Run until the window closes, the deadline passes or a thread fails.
pub fn run(config: &EngineConfig, options: RunOptions) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let layout = config.layout().context("Invalid configuration")?;
    let shape = layout.shape;

    info!(
        "Starting cellsynth: {}x{} grid, {} layers, {} samples per tick at {} Hz, reduction factor {}",
        shape.width,
        shape.height,
        shape.layers,
        layout.samples_per_tick,
        layout.sample_rate,
        layout.reduction_factor
    );

    let tables = AutomatonTables::preset(shape.layers);
    let kernels = create_kernels(config.compute.backend, layout, tables, &seed_state(shape))
        .context("Failed to create compute kernels")?;
    let backend = kernels.name().to_string();
    info!("Compute backend: {}", backend);

    let exchange = SharedExchange::new(
        AudioChunkQueue::new(layout.samples_per_tick, layout.sample_rate),
        TextureSlot::new(shape.width, shape.height),
    );
    let shutdown = ShutdownSignal::new();

    // Stream stays on this thread; only the writer moves to the consumer
    let (output, writer) =
        CpalOutput::open(layout.sample_rate).context("Failed to open audio output")?;

    let mut driver = SimulationDriver::new(kernels, exchange.clone(), shutdown.clone())
        .context("Failed to start simulation driver")?;
    let mut consumer = AudioConsumer::new(writer, exchange.clone(), shutdown.clone());

    let driver_handle = spawn_worker("sim-driver", shutdown.clone(), move || driver.run())
        .context("Failed to spawn driver thread")?;
    let audio_handle = match spawn_worker("audio-out", shutdown.clone(), move || consumer.run()) {
        Ok(handle) => handle,
        Err(e) => {
            shutdown.request();
            if let Err(driver_err) = join_worker("sim-driver", driver_handle) {
                warn!("{:#}", driver_err);
            }
            return Err(e).context("Failed to spawn audio thread");
        }
    };

    let deadline = options.duration.map(|d| Instant::now() + d);
    let viewer_result = if options.headless {
        info!("Running headless");
        if wait_for_shutdown(&shutdown, deadline) {
            info!("Duration elapsed");
        }
        Ok(())
    } else {
        // The viewer owns the main thread, so a deadline needs its own timer
        let timer = match deadline {
            Some(deadline) => match spawn_deadline(&shutdown, deadline) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!("Failed to spawn deadline timer, --duration is ignored: {}", e);
                    None
                }
            },
            None => None,
        };
        let result = gui::run(
            exchange.clone(),
            shutdown.clone(),
            ViewerInfo {
                backend: backend.clone(),
                chunk_seconds: layout.chunk_seconds(),
            },
        );
        shutdown.request();
        if let Some(handle) = timer {
            if let Err(e) = join_worker("deadline", handle) {
                warn!("{:#}", e);
            }
        }
        result
    };

    if shutdown.request() {
        info!("Shutting down");
    }

    let driver_result = join_worker("sim-driver", driver_handle);
    let audio_result = join_worker("audio-out", audio_handle);
    drop(output);

    let (queued, buffered) = exchange.queue_depth();
    info!(
        "Stopped: {} chunks ({:.3}s) left in queue",
        queued, buffered
    );

    viewer_result.context("Viewer failed")?;
    driver_result?;
    audio_result?;
    Ok(())
}
