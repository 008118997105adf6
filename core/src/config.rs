//! Configuration management (~/.config/cellsynth/config.toml)
//!
//! Settings are stored in TOML format in the platform-specific config
//! directory. Every structural parameter is fixed at startup; the engine
//! validates the whole configuration once before any thread starts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::grid::GridShape;
use crate::kernels::KernelLayout;
use crate::queue::MAX_BUFFERED_SECONDS;

/// Highest accepted output sample rate, in Hz.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Grid geometry
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Synthesis and reduction parameters
    #[serde(default)]
    pub audio: AudioConfig,
    /// Compute backend selection
    #[serde(default)]
    pub compute: ComputeConfig,
}

/// Grid geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Grid width and height (default: 16)
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,
    /// Number of layers (default: 4)
    #[serde(default = "default_layers")]
    pub layers: usize,
}

/// Audio synthesis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output sample rate in Hz (default: 44100)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Samples synthesized per tick (default: 1024)
    #[serde(default = "default_samples_per_tick")]
    pub samples_per_tick: usize,
    /// Cells summed by each render work item (default: 1)
    #[serde(default = "default_reduction_factor")]
    pub reduction_factor: usize,
}

/// Compute backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ComputeConfig {
    /// Which kernel backend to use (default: auto)
    #[serde(default)]
    pub backend: BackendChoice,
}

/// Kernel backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// GPU if one is available, otherwise the CPU reference kernels
    #[default]
    Auto,
    /// GPU only; a missing device is fatal
    Gpu,
    /// CPU reference kernels
    Cpu,
}

impl fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Gpu => "gpu",
            Self::Cpu => "cpu",
        })
    }
}

impl FromStr for BackendChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gpu" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            other => Err(format!("unknown backend '{other}' (expected auto, gpu or cpu)")),
        }
    }
}

fn default_grid_size() -> usize {
    16
}
fn default_layers() -> usize {
    4
}
fn default_sample_rate() -> u32 {
    44_100
}
fn default_samples_per_tick() -> usize {
    1024
}
fn default_reduction_factor() -> usize {
    1
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            layers: default_layers(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            samples_per_tick: default_samples_per_tick(),
            reduction_factor: default_reduction_factor(),
        }
    }
}

fn require_power_of_two(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value.is_power_of_two() {
        Ok(())
    } else {
        Err(ConfigError::NotPowerOfTwo { name, value })
    }
}

impl EngineConfig {
    pub fn shape(&self) -> GridShape {
        GridShape::square(self.simulation.grid_size, self.simulation.layers)
    }

    /// Check every structural parameter.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.simulation.grid_size;
        require_power_of_two("grid_size", n)?;
        require_power_of_two("layers", self.simulation.layers)?;
        require_power_of_two("samples_per_tick", self.audio.samples_per_tick)?;
        require_power_of_two("reduction_factor", self.audio.reduction_factor)?;

        if self.audio.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.audio.sample_rate > MAX_SAMPLE_RATE {
            return Err(ConfigError::SampleRateTooHigh {
                rate: self.audio.sample_rate,
                max: MAX_SAMPLE_RATE,
            });
        }

        // Every buffer must be addressable in bytes: the f32 grid, the RGBA8
        // texture and the reduction scratch.
        let too_large = || ConfigError::GridTooLarge {
            grid_size: n,
            layers: self.simulation.layers,
        };
        let cells = n.checked_mul(n).ok_or_else(too_large)?;
        let word = std::mem::size_of::<f32>();
        let grid_bytes = cells
            .checked_mul(self.simulation.layers)
            .and_then(|len| len.checked_mul(word));
        let texture_bytes = cells.checked_mul(4);
        let partial_bytes = (cells / self.audio.reduction_factor)
            .checked_mul(self.audio.samples_per_tick)
            .and_then(|len| len.checked_mul(word));
        if grid_bytes.is_none() || texture_bytes.is_none() || partial_bytes.is_none() {
            return Err(too_large());
        }

        if self.audio.reduction_factor > cells {
            return Err(ConfigError::ReductionTooLarge {
                factor: self.audio.reduction_factor,
                cells,
            });
        }

        let seconds = self.audio.samples_per_tick as f64 / self.audio.sample_rate as f64;
        if seconds > MAX_BUFFERED_SECONDS {
            return Err(ConfigError::ChunkTooLong {
                seconds,
                ceiling: MAX_BUFFERED_SECONDS,
            });
        }

        Ok(())
    }

    /// Validate and derive the kernel dispatch layout.
    pub fn layout(&self) -> Result<KernelLayout, ConfigError> {
        self.validate()?;
        Ok(KernelLayout {
            shape: self.shape(),
            reduction_factor: self.audio.reduction_factor,
            samples_per_tick: self.audio.samples_per_tick,
            sample_rate: self.audio.sample_rate,
        })
    }

    /// Parse a config file, surfacing any error.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Write this config to `path`, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/cellsynth`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.cellsynth", "", "cellsynth")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Path of the default config file, if a config directory exists.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Loads the configuration from disk.
///
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> EngineConfig {
    config_path()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| toml::from_str(&content).ok())
        .unwrap_or_default()
}

/// Saves the configuration to the platform config directory.
pub fn save(config: &EngineConfig) -> Result<(), ConfigError> {
    match config_path() {
        Some(path) => config.save_to_path(&path),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.simulation.grid_size, 16);
        assert_eq!(config.simulation.layers, 4);
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.samples_per_tick, 1024);
        assert_eq!(config.audio.reduction_factor, 1);
        assert_eq!(config.compute.backend, BackendChoice::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_config_deserialize_partial() {
        let toml_str = r#"
[audio]
reduction_factor = 16

[compute]
backend = "cpu"
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.audio.reduction_factor, 16);
        assert_eq!(config.audio.samples_per_tick, 1024); // default
        assert_eq!(config.simulation.grid_size, 16); // default
        assert_eq!(config.compute.backend, BackendChoice::Cpu);
    }

    #[test]
    fn test_validate_rejects_non_power_of_two() {
        let mut config = EngineConfig::default();
        config.audio.samples_per_tick = 1000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPowerOfTwo {
                name: "samples_per_tick",
                value: 1000
            })
        ));

        let mut config = EngineConfig::default();
        config.simulation.layers = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPowerOfTwo { name: "layers", .. })
        ));
    }

    #[test]
    fn test_validate_sample_rate_need_not_be_power_of_two() {
        let mut config = EngineConfig::default();
        config.audio.sample_rate = 48_000;
        assert!(config.validate().is_ok());
        config.audio.sample_rate = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroSampleRate)));
    }

    #[test]
    fn test_validate_reduction_bounds() {
        let mut config = EngineConfig::default();
        config.simulation.grid_size = 4;
        config.audio.reduction_factor = 16;
        assert!(config.validate().is_ok());
        config.audio.reduction_factor = 32;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ReductionTooLarge {
                factor: 32,
                cells: 16
            })
        ));
    }

    #[test]
    fn test_validate_rejects_unaddressable_grid() {
        let mut config = EngineConfig::default();
        config.simulation.grid_size = 1 << (usize::BITS / 2);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::GridTooLarge { layers: 4, .. })
        ));

        // Cells fit, but the layered f32 buffer does not
        let mut config = EngineConfig::default();
        config.simulation.grid_size = 1 << (usize::BITS / 2 - 1);
        config.simulation.layers = 1 << 2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_excessive_sample_rate() {
        let mut config = EngineConfig::default();
        config.audio.samples_per_tick = 1;
        config.audio.sample_rate = 4_000_000_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SampleRateTooHigh {
                rate: 4_000_000_000,
                max: MAX_SAMPLE_RATE
            })
        ));
        config.audio.sample_rate = MAX_SAMPLE_RATE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_chunk_longer_than_ceiling() {
        let mut config = EngineConfig::default();
        config.audio.sample_rate = 1000;
        config.audio.samples_per_tick = 1024;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ChunkTooLong { .. })
        ));
    }

    #[test]
    fn test_backend_choice_parse_and_display() {
        assert_eq!("GPU".parse::<BackendChoice>(), Ok(BackendChoice::Gpu));
        assert_eq!("cpu".parse::<BackendChoice>(), Ok(BackendChoice::Cpu));
        assert!("metal".parse::<BackendChoice>().is_err());
        assert_eq!(BackendChoice::Auto.to_string(), "auto");
    }

    #[test]
    fn test_save_and_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = EngineConfig::default();
        config.simulation.grid_size = 64;
        config.compute.backend = BackendChoice::Gpu;
        config.save_to_path(&path).unwrap();

        let loaded = EngineConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_path_surfaces_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[simulation]\ngrid_size = \"big\"\n").unwrap();
        assert!(matches!(
            EngineConfig::load_from_path(&path),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::load_from_path(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_layout_matches_config() {
        let mut config = EngineConfig::default();
        config.audio.reduction_factor = 16;
        let layout = config.layout().unwrap();
        assert_eq!(layout.groups(), 16);
        assert_eq!(layout.partial_len(), 16 * 1024);
    }
}
