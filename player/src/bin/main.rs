//! cellsynth - cellular automaton synthesizer
//!
//! Runs a layered cellular automaton on the GPU (or CPU), shows it in a
//! window and plays it as audio.
//!
//! # Usage
//!
//! ```bash
//! cellsynth
//! cellsynth --grid-size 64 --layers 2
//! cellsynth --backend cpu --headless --duration 10
//! cellsynth --config my-config.toml --save-config
//! ```
//!
//! # Keyboard Shortcuts
//!
//! - ESC: Quit
//! - F11: Toggle fullscreen

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cellsynth_core::{BackendChoice, config};
use cellsynth_player::{RunOptions, run};

#[derive(Parser)]
#[command(name = "cellsynth")]
#[command(
    author,
    version,
    about = "cellsynth - a GPU cellular automaton you can see and hear"
)]
struct Args {
    /// Config file to load instead of the user config
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the resulting config to the user config file
    #[arg(long)]
    save_config: bool,

    // === Simulation ===
    /// Grid width and height in cells (power of two)
    #[arg(long, short = 'n')]
    grid_size: Option<usize>,

    /// Number of state layers (power of two)
    #[arg(long, short = 'm')]
    layers: Option<usize>,

    // === Audio ===
    /// Output sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Audio samples produced per tick (power of two)
    #[arg(long)]
    samples_per_tick: Option<usize>,

    /// Cells summed per partial audio buffer (power of two)
    #[arg(long)]
    reduction_factor: Option<usize>,

    // === Runtime ===
    /// Compute backend: auto, gpu or cpu
    #[arg(long)]
    backend: Option<BackendChoice>,

    /// Run without the viewer window
    #[arg(long)]
    headless: bool,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    duration: Option<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::EngineConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => config::load(),
    };

    if let Some(grid_size) = args.grid_size {
        config.simulation.grid_size = grid_size;
    }
    if let Some(layers) = args.layers {
        config.simulation.layers = layers;
    }
    if let Some(sample_rate) = args.sample_rate {
        config.audio.sample_rate = sample_rate;
    }
    if let Some(samples_per_tick) = args.samples_per_tick {
        config.audio.samples_per_tick = samples_per_tick;
    }
    if let Some(reduction_factor) = args.reduction_factor {
        config.audio.reduction_factor = reduction_factor;
    }
    if let Some(backend) = args.backend {
        config.compute.backend = backend;
    }

    let duration = match args.duration {
        Some(secs) if !secs.is_finite() || secs <= 0.0 => {
            anyhow::bail!("Duration must be a positive number of seconds, got {}", secs)
        }
        Some(secs) => Some(Duration::from_secs_f64(secs)),
        None => None,
    };

    config.validate().context("Invalid configuration")?;

    if args.save_config {
        config::save(&config).context("Failed to save config")?;
        if let Some(path) = config::config_path() {
            tracing::info!("Saved config to {}", path.display());
        }
    }

    run(
        &config,
        RunOptions {
            headless: args.headless,
            duration,
        },
    )
}
