//! Shared test helpers

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::audio::AudioSink;
use crate::config::EngineConfig;
use crate::error::SinkError;
use crate::exchange::SharedExchange;
use crate::kernels::CpuKernels;
use crate::queue::AudioChunkQueue;
use crate::rules::{AutomatonTables, seed_state};
use crate::texture::TextureSlot;

/// In-memory sink that records everything written to it.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    sample_rate: u32,
    recorded: Arc<Mutex<Vec<f32>>>,
    latency_us: Arc<AtomicU64>,
    failing: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            recorded: Arc::new(Mutex::new(Vec::new())),
            latency_us: Arc::new(AtomicU64::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle to the recorded samples, usable after the sink moved.
    pub fn recorded(&self) -> Arc<Mutex<Vec<f32>>> {
        Arc::clone(&self.recorded)
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_us
            .store(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// Make every later write fail.
    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::Relaxed);
    }
}

impl AudioSink for RecordingSink {
    fn write(&mut self, samples: &[f32]) -> Result<(), SinkError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(SinkError::Device("recording sink set to fail".into()));
        }
        self.recorded.lock().unwrap().extend_from_slice(samples);
        Ok(())
    }

    fn latency(&self) -> Duration {
        Duration::from_micros(self.latency_us.load(Ordering::Relaxed))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Config with the given structural parameters and CPU kernels.
pub fn config(
    n: usize,
    m: usize,
    reduction_factor: usize,
    samples_per_tick: usize,
    sample_rate: u32,
) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.simulation.grid_size = n;
    config.simulation.layers = m;
    config.audio.reduction_factor = reduction_factor;
    config.audio.samples_per_tick = samples_per_tick;
    config.audio.sample_rate = sample_rate;
    config
}

/// Preset-seeded CPU kernels plus a matching empty exchange.
pub fn cpu_setup(config: &EngineConfig) -> (Box<CpuKernels>, SharedExchange) {
    let layout = config.layout().unwrap();
    let shape = layout.shape;
    let kernels = CpuKernels::new(
        layout,
        AutomatonTables::preset(shape.layers),
        &seed_state(shape),
    )
    .unwrap();
    let exchange = SharedExchange::new(
        AudioChunkQueue::new(layout.samples_per_tick, layout.sample_rate),
        TextureSlot::new(shape.width, shape.height),
    );
    (Box::new(kernels), exchange)
}
