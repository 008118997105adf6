//! Error types for the engine
//!
//! Errors fall into three groups: initialization errors ([`ConfigError`],
//! and the device/build variants of [`KernelError`] and [`SinkError`]) that
//! stop the process before any thread starts, runtime errors that end a
//! thread and trigger cooperative shutdown, and [`PublishError`] for the
//! exchange's all-or-nothing publish step.

use thiserror::Error;

use crate::queue::AudioChunk;

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a non-zero power of two, got {value}")]
    NotPowerOfTwo { name: &'static str, value: usize },

    #[error("sample rate must be non-zero")]
    ZeroSampleRate,

    #[error("sample rate {rate} Hz exceeds the supported maximum of {max} Hz")]
    SampleRateTooHigh { rate: u32, max: u32 },

    #[error("a {grid_size}x{grid_size} grid with {layers} layers does not fit in memory")]
    GridTooLarge { grid_size: usize, layers: usize },

    #[error("reduction factor {factor} exceeds the {cells} cells of one grid layer")]
    ReductionTooLarge { factor: usize, cells: usize },

    #[error("one tick of audio lasts {seconds:.3}s, longer than the {ceiling:.3}s queue ceiling")]
    ChunkTooLong { seconds: f64, ceiling: f64 },

    #[error("failed to read or write config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Failure of a compute backend, either while building kernels or while
/// dispatching them.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("no compatible compute adapter found: {0}")]
    NoAdapter(String),

    #[error("failed to create compute device: {0}")]
    Device(String),

    #[error("kernel `{kernel}` failed to build: {message}")]
    Build {
        kernel: &'static str,
        message: String,
    },

    #[error("kernel `{kernel}` cannot dispatch {invocations} invocations: {reason}")]
    UnsupportedShape {
        kernel: &'static str,
        invocations: u64,
        reason: String,
    },

    #[error("{what} size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("device synchronization failed: {0}")]
    Sync(String),

    #[error("device readback failed: {0}")]
    Readback(String),
}

/// Failure of the audio output device.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("audio device does not support {0}")]
    UnsupportedFormat(String),

    #[error("failed to open audio stream: {0}")]
    Stream(String),

    #[error("audio stream failed: {0}")]
    Device(String),
}

/// Rejected publish; neither the texture slot nor the queue was modified.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("audio queue is full ({buffered_seconds:.3}s buffered)")]
    QueueFull {
        chunk: AudioChunk,
        buffered_seconds: f64,
    },

    #[error("audio chunk has {actual} samples, queue expects {expected}")]
    ChunkLength { expected: usize, actual: usize },

    #[error("texture has {actual} bytes, slot expects {expected}")]
    TextureLength { expected: usize, actual: usize },
}

/// Fatal error at a thread boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("shared texture slot is {slot:?} but the grid produces {grid:?}")]
    TextureDimensions {
        slot: (usize, usize),
        grid: (usize, usize),
    },
}
