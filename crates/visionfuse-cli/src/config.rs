//! Deployment configuration – reads/writes `~/.visionfuse/config.toml`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use visionfuse_middleware::OverflowPolicy;
use visionfuse_perception::ConfidenceConfig;
use visionfuse_runtime::{LogFormat, TelemetryConfig};
use visionfuse_types::SourceId;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One configured vision source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Pipeline selected at startup.
    #[serde(default)]
    pub pipeline_index: u32,
}

impl SourceConfig {
    pub fn id(&self) -> SourceId {
        SourceId::new(self.name.as_str())
    }
}

/// Parameters of the simulated robot driven by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Odometry over-report factor (`1.02` = 2 % wheel slip).
    pub odometry_scale: f64,
    /// Commanded forward speed, m/s.
    pub vx: f64,
    /// Commanded rotation rate, rad/s.
    pub omega: f64,
    /// Image area (%) of the tag every simulated camera sees.
    pub target_area: f64,
    pub target_ambiguity: f64,
}

impl SimulationConfig {
    fn validate(&self) -> Result<(), String> {
        if !(self.odometry_scale.is_finite() && self.odometry_scale > 0.0) {
            return Err("simulation.odometry_scale must be positive".into());
        }
        if !(self.vx.is_finite() && self.omega.is_finite()) {
            return Err("simulation.vx and simulation.omega must be finite".into());
        }
        if !(self.target_area.is_finite() && self.target_area >= 0.0) {
            return Err("simulation.target_area must be a non-negative percentage".into());
        }
        if !(0.0..=1.0).contains(&self.target_ambiguity) {
            return Err("simulation.target_ambiguity must be in [0, 1]".into());
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            odometry_scale: 1.02,
            vx: 0.5,
            omega: 0.0,
            target_area: 1.2,
            target_ambiguity: 0.05,
        }
    }
}

/// Persisted configuration stored in `~/.visionfuse/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Vision task period in milliseconds.
    #[serde(default = "default_vision_period_ms")]
    pub vision_period_ms: u64,

    /// Drive task (control loop) period in milliseconds.
    #[serde(default = "default_drive_period_ms")]
    pub drive_period_ms: u64,

    /// Overflow policy shared by every source buffer.
    #[serde(default)]
    pub buffer: OverflowPolicy,

    #[serde(default)]
    pub confidence: ConfidenceConfig,

    /// The closed set of vision sources, in drain order.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_vision_period_ms() -> u64 {
    20
}
fn default_drive_period_ms() -> u64 {
    20
}
fn default_sources() -> Vec<SourceConfig> {
    ["CAMERA 1", "CAMERA 2"]
        .into_iter()
        .map(|name| SourceConfig {
            name: name.to_string(),
            pipeline_index: 0,
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vision_period_ms: default_vision_period_ms(),
            drive_period_ms: default_drive_period_ms(),
            buffer: OverflowPolicy::default(),
            confidence: ConfidenceConfig::default(),
            sources: default_sources(),
            telemetry: TelemetryConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    /// Reject anything the tasks cannot run with.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vision_period_ms == 0 {
            return Err(ConfigError::Invalid("vision_period_ms must be positive".into()));
        }
        if self.drive_period_ms == 0 {
            return Err(ConfigError::Invalid("drive_period_ms must be positive".into()));
        }
        if self.buffer.capacity() == Some(0) {
            return Err(ConfigError::Invalid("buffer capacity must be at least 1".into()));
        }
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("at least one source must be configured".into()));
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::Invalid("source names must not be blank".into()));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate source '{}'", source.name)));
            }
        }
        self.confidence.validate().map_err(ConfigError::Invalid)?;
        self.simulation.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(SourceConfig::id).collect()
    }
}

/// Return the path to `~/.visionfuse/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".visionfuse").join("config.toml")
}

/// Load the config from `path`, or the defaults if it does not exist, then
/// apply environment overrides.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config file at `path` as written. Returns `None` if the file
/// does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(toml::from_str(&raw)?))
}

/// Apply `VISIONFUSE_*` environment variable overrides to `cfg`.
///
/// Unparseable values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `VISIONFUSE_VISION_PERIOD_MS` | `vision_period_ms` |
/// | `VISIONFUSE_DRIVE_PERIOD_MS` | `drive_period_ms` |
/// | `VISIONFUSE_BUFFER_CAPACITY` | `buffer` (switches to drop-oldest) |
/// | `VISIONFUSE_MAX_AMBIGUITY` | `confidence.max_allowed_ambiguity` |
/// | `VISIONFUSE_LOG_FORMAT` | `telemetry.log_format` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("VISIONFUSE_VISION_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.vision_period_ms = ms;
    }
    if let Ok(v) = std::env::var("VISIONFUSE_DRIVE_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.drive_period_ms = ms;
    }
    if let Ok(v) = std::env::var("VISIONFUSE_BUFFER_CAPACITY")
        && let Ok(capacity) = v.parse::<usize>()
    {
        cfg.buffer = OverflowPolicy::DropOldest { capacity };
    }
    if let Ok(v) = std::env::var("VISIONFUSE_MAX_AMBIGUITY")
        && let Ok(ambiguity) = v.parse::<f64>()
    {
        cfg.confidence.max_allowed_ambiguity = ambiguity;
    }
    if let Ok(v) = std::env::var("VISIONFUSE_LOG_FORMAT")
        && let Ok(format) = v.parse::<LogFormat>()
    {
        cfg.telemetry.log_format = format;
    }
}

/// Save the config to `path`, creating parent directories as needed.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    fs::write(path, raw).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}
