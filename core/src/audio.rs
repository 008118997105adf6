//! Audio output consumer
//!
//! Drains the shared queue into an [`AudioSink`], paced by the sink's
//! reported latency. Underflow is logged once per transition from playing
//! to starved, never once per empty poll.

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{EngineError, SinkError};
use crate::exchange::SharedExchange;
use crate::shutdown::ShutdownSignal;

/// Device latency at or above which the consumer stops feeding the sink.
pub const MAX_SINK_LATENCY: Duration = Duration::from_secs(1);

/// Sleep after a poll that did not play anything.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Destination for mono `f32` samples at a fixed rate.
pub trait AudioSink: Send {
    /// Append `samples` to the playback stream.
    fn write(&mut self, samples: &[f32]) -> Result<(), SinkError>;

    /// Playback time buffered in the device but not yet heard.
    fn latency(&self) -> Duration;

    fn sample_rate(&self) -> u32;
}

/// Edge detector for underflow notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnderflowState {
    /// Audio has been played since the last notice.
    NotWarned,
    /// A notice was emitted (or nothing has played yet).
    Warned,
}

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A chunk went to the sink.
    Played,
    /// The queue was empty.
    Empty,
    /// The sink already holds enough audio.
    Throttled,
}

/// Moves chunks from the exchange to a sink.
pub struct AudioConsumer<S: AudioSink> {
    sink: S,
    exchange: SharedExchange,
    shutdown: ShutdownSignal,
    state: UnderflowState,
    chunks_played: u64,
    underflow_notices: u64,
    last_start_time: Option<f64>,
}

impl<S: AudioSink> AudioConsumer<S> {
    /// Starts in [`UnderflowState::Warned`] so an empty queue at startup is silent.
    pub fn new(sink: S, exchange: SharedExchange, shutdown: ShutdownSignal) -> Self {
        Self {
            sink,
            exchange,
            shutdown,
            state: UnderflowState::Warned,
            chunks_played: 0,
            underflow_notices: 0,
            last_start_time: None,
        }
    }

    pub fn state(&self) -> UnderflowState {
        self.state
    }

    pub fn chunks_played(&self) -> u64 {
        self.chunks_played
    }

    /// Underflow notices emitted so far.
    pub fn underflow_notices(&self) -> u64 {
        self.underflow_notices
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Poll the queue once.
    pub fn poll_once(&mut self) -> Result<PollOutcome, SinkError> {
        if self.sink.latency() >= MAX_SINK_LATENCY {
            return Ok(PollOutcome::Throttled);
        }

        match self.exchange.dequeue_audio() {
            Some(chunk) => {
                if let Some(previous) = self.last_start_time {
                    debug_assert!(chunk.start_time > previous, "chunks out of order");
                }
                self.last_start_time = Some(chunk.start_time);
                self.state = UnderflowState::NotWarned;
                self.sink.write(&chunk.samples)?;
                self.chunks_played += 1;
                Ok(PollOutcome::Played)
            }
            None => {
                if self.state == UnderflowState::NotWarned {
                    warn!(
                        "Audio underflow after {} chunks: queue empty",
                        self.chunks_played
                    );
                    self.underflow_notices += 1;
                    self.state = UnderflowState::Warned;
                }
                Ok(PollOutcome::Empty)
            }
        }
    }

    /// Poll until the shutdown flag is raised or the sink fails.
    pub fn run(&mut self) -> Result<(), EngineError> {
        info!(
            "Audio consumer running at {} Hz",
            self.sink.sample_rate()
        );

        while !self.shutdown.is_requested() {
            if self.poll_once()? != PollOutcome::Played {
                thread::sleep(POLL_INTERVAL);
            }
        }

        debug!(
            "Audio consumer stopped: {} chunks played, {} underflows",
            self.chunks_played, self.underflow_notices
        );
        Ok(())
    }
}
