//! Simulation driver
//!
//! Runs the tick state machine on the compute thread:
//!
//! ```text
//! CheckBackpressure ──full──► Idle (sleep, retry)
//!        │ room
//!        ▼
//!     Advance ──► Visualize ──► RenderReduce ──► Publish ──► Idle
//! ```
//!
//! Grid roles toggle only once a tick is fully published, so a failed or
//! skipped iteration never leaves the grid half advanced.

mod metrics;


use std::thread;
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::error::EngineError;
use crate::exchange::SharedExchange;
use crate::grid::{BufferSlot, GridState};
use crate::kernels::{ComputeKernelSet, KernelLayout};
use crate::queue::AudioChunk;
use crate::reduction::ReductionTree;
use crate::shutdown::ShutdownSignal;

use metrics::DriverMetrics;

/// Sleep between retries while the audio queue is full.
pub const BACKPRESSURE_SLEEP: Duration = Duration::from_millis(1);

/// Where the driver is within the current iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    CheckBackpressure,
    Advance,
    Visualize,
    RenderReduce,
    Publish,
    Idle,
}

/// Result of one driver iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A full tick was computed and published.
    Ticked,
    /// The audio queue was full; no GPU work was issued.
    Backpressured,
}

/// Owns the kernels and the grid roles; publishes one tick per step.
pub struct SimulationDriver {
    kernels: Box<dyn ComputeKernelSet>,
    layout: KernelLayout,
    grid: GridState,
    reduction: ReductionTree,
    exchange: SharedExchange,
    shutdown: ShutdownSignal,
    phase: TickPhase,
    texture: Vec<u8>,
    metrics: DriverMetrics,
}

impl SimulationDriver {
    /// Wire a kernel set to the exchange.
    ///
    /// # Errors
    ///
    /// Fails if the exchange's texture slot does not match the grid.
    pub fn new(
        kernels: Box<dyn ComputeKernelSet>,
        exchange: SharedExchange,
        shutdown: ShutdownSignal,
    ) -> Result<Self, EngineError> {
        let layout = *kernels.layout();
        let shape = layout.shape;
        let slot = exchange.texture_dimensions();
        if slot != (shape.width, shape.height) {
            return Err(EngineError::TextureDimensions {
                slot,
                grid: (shape.width, shape.height),
            });
        }

        let reduction = ReductionTree::new(layout.groups());
        debug!(
            "Driver using {} kernels: {}x{}x{} grid, {} groups, {} reduction steps",
            kernels.name(),
            shape.width,
            shape.height,
            shape.layers,
            layout.groups(),
            reduction.depth()
        );

        Ok(Self {
            kernels,
            layout,
            grid: GridState::new(shape),
            reduction,
            exchange,
            shutdown,
            phase: TickPhase::Idle,
            texture: vec![0; layout.texture_len()],
            metrics: DriverMetrics::new(),
        })
    }

    /// Synthesis time of the next tick's first sample.
    pub fn t(&self) -> f64 {
        self.grid.completed_ticks() as f64 * self.layout.chunk_seconds()
    }

    /// Ticks published so far.
    pub fn ticks(&self) -> u64 {
        self.grid.completed_ticks()
    }

    /// Grid buffer holding the latest published state.
    pub fn current_buffer(&self) -> BufferSlot {
        self.grid.current()
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    /// Iterations skipped for backpressure so far.
    pub fn backpressure_idles(&self) -> u64 {
        self.metrics.backpressure_idles
    }

    pub fn reduction(&self) -> &ReductionTree {
        &self.reduction
    }

    pub fn kernels_mut(&mut self) -> &mut dyn ComputeKernelSet {
        self.kernels.as_mut()
    }

    /// Run one iteration: either a full tick or a backpressure skip.
    pub fn step(&mut self) -> Result<StepOutcome, EngineError> {
        self.phase = TickPhase::CheckBackpressure;
        if !self.exchange.has_audio_room() {
            self.phase = TickPhase::Idle;
            self.metrics.backpressure_idles += 1;
            return Ok(StepOutcome::Backpressured);
        }

        let current = self.grid.current();
        let next = self.grid.next();
        let t = self.t();

        self.phase = TickPhase::Advance;
        self.kernels.advance(current, next)?;

        self.phase = TickPhase::Visualize;
        self.kernels.visualize(next)?;

        self.phase = TickPhase::RenderReduce;
        self.kernels
            .render_audio(next, t, self.reduction.input_slot())?;
        self.reduction.run(self.kernels.as_mut())?;

        self.phase = TickPhase::Publish;
        self.kernels.synchronize()?;
        self.kernels.read_texture(&mut self.texture)?;
        let mut samples = vec![0.0; self.layout.samples_per_tick];
        self.kernels
            .read_audio(self.reduction.result_slot(), &mut samples)?;

        let chunk = AudioChunk {
            sequence: self.grid.completed_ticks(),
            start_time: t,
            samples,
        };
        self.exchange.publish(&self.texture, chunk)?;
        self.grid.complete_tick();
        self.metrics.ticks += 1;

        trace!("tick {} published at t={:.4}s", self.grid.completed_ticks(), t);
        self.phase = TickPhase::Idle;
        Ok(StepOutcome::Ticked)
    }

    /// Step until the shutdown flag is raised or a step fails.
    pub fn run(&mut self) -> Result<(), EngineError> {
        info!("Simulation driver running ({} kernels)", self.kernels.name());

        while !self.shutdown.is_requested() {
            if self.step()? == StepOutcome::Backpressured {
                thread::sleep(BACKPRESSURE_SLEEP);
            }
            let (chunks, seconds) = self.exchange.queue_depth();
            self.metrics.maybe_log(chunks, seconds);
        }

        info!(
            "Simulation driver stopped after {} ticks (t={:.3}s)",
            self.ticks(),
            self.t()
        );
        Ok(())
    }
}
