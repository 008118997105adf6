//! cellsynth core - audio-visual cellular automaton engine
//!
//! This crate owns the synchronization and data flow between the three
//! long-lived threads of a cellsynth process. It has no device dependencies:
//! GPU kernels, the audio device and the GUI plug in through traits and the
//! shared exchange.
//!
//! # Architecture
//!
//! ```text
//! Driver Thread                   Shared Exchange              Consumers
//!     │                                 │                           │
//! [Check Backpressure]◄──(lock)───[AudioChunkQueue]                  │
//! [Advance Grid A→B]                    │                           │
//! [Visualize]                           │                           │
//! [Render + Reduce]                     │                           │
//! [Synchronize]                         │                           │
//! [Publish]─────────────(lock)────►[TextureSlot]────(lock)────►[GUI Frame]
//!     │                          [AudioChunkQueue]───(lock)────►[Audio Sink]
//! ```
//!
//! - [`SimulationDriver`] - tick state machine on the compute thread
//! - [`ComputeKernelSet`] - the four dispatch operations plus readback
//! - [`ReductionTree`] - pairwise reduction of partial audio buffers
//! - [`SharedExchange`] - queue and texture slot behind one lock
//! - [`AudioConsumer`] - latency-paced drain into an [`AudioSink`]
//! - [`ShutdownSignal`] - cooperative cancellation flag

pub mod audio;
pub mod config;
pub mod driver;
pub mod error;
pub mod exchange;
pub mod grid;
#[cfg(test)]
mod integration;
pub mod kernels;
pub mod queue;
pub mod reduction;
pub mod rules;
pub mod shutdown;
pub mod texture;
#[cfg(test)]
pub mod test_utils;
pub mod worker;

pub use audio::{AudioConsumer, AudioSink, PollOutcome, UnderflowState};
pub use config::{BackendChoice, EngineConfig};
pub use driver::{SimulationDriver, StepOutcome, TickPhase};
pub use error::{ConfigError, EngineError, KernelError, PublishError, SinkError};
pub use exchange::SharedExchange;
pub use grid::{BufferSlot, GridShape, GridState, PingPong};
pub use kernels::{ComputeKernelSet, CpuKernels, KernelLayout};
pub use queue::{AudioChunk, AudioChunkQueue, MAX_BUFFERED_SECONDS};
pub use reduction::{ReductionStep, ReductionTree};
pub use rules::{AutomatonTables, ColorTable, FrequencyTable, RuleTensor};
pub use shutdown::ShutdownSignal;
pub use texture::TextureSlot;
pub use worker::spawn_worker;
