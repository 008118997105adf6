//! Driver throughput monitoring

use std::time::Instant;

use tracing::debug;

/// Counters for the simulation loop, logged once per second.
#[derive(Debug, Clone)]
pub(super) struct DriverMetrics {
    /// Ticks published since startup
    pub ticks: u64,
    /// Iterations skipped because the audio queue was full
    pub backpressure_idles: u64,
    /// Tick count at the last log line
    ticks_at_last_log: u64,
    /// Idle count at the last log line
    idles_at_last_log: u64,
    last_log_time: Instant,
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self {
            ticks: 0,
            backpressure_idles: 0,
            ticks_at_last_log: 0,
            idles_at_last_log: 0,
            last_log_time: Instant::now(),
        }
    }

    /// Log metrics if at least a second has passed since the last log.
    pub fn maybe_log(&mut self, queued_chunks: usize, buffered_seconds: f64) {
        let elapsed = self.last_log_time.elapsed();
        if elapsed.as_secs() < 1 {
            return;
        }

        let ticks = self.ticks - self.ticks_at_last_log;
        let idles = self.backpressure_idles - self.idles_at_last_log;
        debug!(
            "DRIVER METRICS: {:.1} ticks/s, idles={}, queue={} chunks ({:.3}s), total ticks={}",
            ticks as f64 / elapsed.as_secs_f64(),
            idles,
            queued_chunks,
            buffered_seconds,
            self.ticks,
        );

        self.ticks_at_last_log = self.ticks;
        self.idles_at_last_log = self.backpressure_idles;
        self.last_log_time = Instant::now();
    }
}
