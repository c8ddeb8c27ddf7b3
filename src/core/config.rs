//! Scheduler configuration — YAML parsing and structural validation.

use crate::core::types::EngineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tuning knobs for one scheduler instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on worker threads per batch; the effective pool size is
    /// `min(max_workers, batch length)`.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Consecutive equal queue-size observations required before a batch is
    /// dispatched. The replay protocol dispatches on the first fixed point;
    /// raise this for bodies with data-dependent discovery order.
    #[serde(default = "default_stabilization_passes")]
    pub stabilization_passes: u32,

    /// Safety bound: batch dispatches allowed per round before the round
    /// fails with `RoundLimit` instead of looping forever.
    #[serde(default = "default_max_batches")]
    pub max_batches: u32,

    /// Serial mode: handles execute calls eagerly with no batching.
    #[serde(default)]
    pub serial: bool,

    /// Directory for the JSONL trace log. `None` disables tracing.
    #[serde(default)]
    pub trace_dir: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            stabilization_passes: default_stabilization_passes(),
            max_batches: default_max_batches(),
            serial: false,
            trace_dir: None,
        }
    }
}

fn default_max_workers() -> usize {
    150
}

fn default_stabilization_passes() -> u32 {
    1
}

fn default_max_batches() -> u32 {
    256
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a config file from disk.
pub fn parse_config_file(path: &Path) -> Result<SchedulerConfig, EngineError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    parse_config(&content)
}

/// Parse a config from a YAML string.
pub fn parse_config(yaml: &str) -> Result<SchedulerConfig, EngineError> {
    serde_yaml_ng::from_str(yaml)
        .map_err(|e| EngineError::Config(format!("YAML parse error: {}", e)))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &SchedulerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.max_workers == 0 {
        errors.push(ValidationError {
            message: "max_workers must be at least 1".to_string(),
        });
    }
    if config.stabilization_passes == 0 {
        errors.push(ValidationError {
            message: "stabilization_passes must be at least 1".to_string(),
        });
    }
    if config.max_batches == 0 {
        errors.push(ValidationError {
            message: "max_batches must be at least 1".to_string(),
        });
    }

    errors
}
