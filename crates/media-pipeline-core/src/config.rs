//! Engine configuration loaded from YAML

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Target frame rate used when none is configured
pub const DEFAULT_TARGET_FPS: f64 = 30.0;

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory scanned for `*.json` pipeline definitions
    pub pipelines_dir: PathBuf,

    /// Directory scanned for `*.yaml` plugin manifests
    pub plugins_dir: PathBuf,

    pub executor: ExecutorConfig,

    pub streaming: BackpressureConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pipelines_dir: PathBuf::from("config/pipelines"),
            plugins_dir: PathBuf::from("config/plugins"),
            executor: ExecutorConfig::default(),
            streaming: BackpressureConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate configuration from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.executor.validate()?;
        self.streaming.validate()
    }
}

/// Pipeline executor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-node timeout in seconds; 0 disables the timeout
    pub node_timeout_secs: u64,

    /// Maximum nodes running at once; 1 runs strictly in topological order
    pub max_parallelism: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            node_timeout_secs: 300, // 5 minutes, matches long-running model tools
            max_parallelism: num_cpus::get(),
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn node_timeout(&self) -> Option<Duration> {
        (self.node_timeout_secs > 0).then(|| Duration::from_secs(self.node_timeout_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallelism == 0 {
            return Err(ConfigError::Invalid(
                "executor.max_parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Thresholds for streaming backpressure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackpressureConfig {
    /// Drop frames once the drop rate exceeds this fraction
    pub drop_threshold: f64,

    /// Ask the client to slow down once the drop rate exceeds this fraction
    pub slowdown_threshold: f64,

    /// Frame budget is `1000 / target_fps` milliseconds
    pub target_fps: f64,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            drop_threshold: 0.10,
            slowdown_threshold: 0.30,
            target_fps: DEFAULT_TARGET_FPS,
        }
    }
}

impl BackpressureConfig {
    /// Processing time budget for one frame, in milliseconds
    #[must_use]
    pub fn frame_budget_ms(&self) -> f64 {
        1000.0 / self.target_fps
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("drop_threshold", self.drop_threshold),
            ("slowdown_threshold", self.slowdown_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "streaming.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.slowdown_threshold <= self.drop_threshold {
            return Err(ConfigError::Invalid(format!(
                "streaming.slowdown_threshold ({}) must be greater than drop_threshold ({})",
                self.slowdown_threshold, self.drop_threshold
            )));
        }
        if !(self.target_fps > 0.0 && self.target_fps.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "streaming.target_fps must be positive, got {}",
                self.target_fps
            )));
        }
        Ok(())
    }
}
