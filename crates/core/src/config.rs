//! Engine configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Severity;

pub const DEFAULT_ARTIFACT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown artifact format tag {0:?}")]
    UnknownFormat(String),

    #[error("invalid severity threshold {0:?}: must be low, medium or high")]
    InvalidSeverityThreshold(String),

    #[error("worker count must be at least 1")]
    InvalidWorkers,

    #[error("artifact timeout must be greater than zero")]
    InvalidTimeout,
}

/// When a pure reorder of unchanged siblings still counts as a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReorderPolicy {
    /// Reorders are always cosmetic.
    Never,
    /// Escalate reorders of nodes whose position affects evaluation order.
    #[default]
    EvaluationOrder,
    /// Every reorder is reported as a low-severity change.
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads for batch runs. `None` uses the available parallelism.
    pub workers: Option<usize>,
    pub artifact_timeout_ms: u64,
    pub reorder_policy: ReorderPolicy,
    /// Minimum entry severity that makes a hash change count as drift.
    pub drift_threshold: Severity,
    /// Record a baseline the first time an artifact is analyzed.
    pub record_first_seen: bool,
    /// Canonicalize and hash twice and fail if the results differ.
    pub self_check: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: None,
            artifact_timeout_ms: DEFAULT_ARTIFACT_TIMEOUT_MS,
            reorder_policy: ReorderPolicy::default(),
            drift_threshold: Severity::Low,
            record_first_seen: true,
            self_check: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidWorkers);
        }
        if self.artifact_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.drift_threshold == Severity::None {
            return Err(ConfigError::InvalidSeverityThreshold(Severity::None.to_string()));
        }
        Ok(())
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.artifact_timeout_ms = timeout_ms;
        self
    }

    pub fn with_reorder_policy(mut self, policy: ReorderPolicy) -> Self {
        self.reorder_policy = policy;
        self
    }

    pub fn with_threshold(mut self, threshold: Severity) -> Self {
        self.drift_threshold = threshold;
        self
    }

    /// Resolved worker count, falling back to the machine's parallelism.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        })
    }
}

/// Load and validate an engine config from a `.json`, `.yaml` or `.yml` file.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read engine config at {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    let config: EngineConfig = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&raw).context("Failed to parse engine config YAML")?,
        _ => serde_json::from_str(&raw).context("Failed to parse engine config JSON")?,
    };
    config.validate().with_context(|| format!("Invalid engine config at {}", path.display()))?;
    Ok(config)
}
