//! Engine configuration stored in `config.yaml`
//!
//! ```yaml
//! workers: 8
//! idle_timeout_ms: 15000
//! publish_interval_ms: 16
//! batch_size: 8
//! seed: 42
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::path::{Path, PathBuf};
use std::thread::available_parallelism;
use std::time::Duration;

use drawsim_core::pool::DEFAULT_TICKET_ARRAY_CAP;
use drawsim_core::simulation::reporting_batch_size;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads (defaults to available parallelism)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Idle workers are torn down after this long without a run
    pub idle_timeout_ms: u64,
    /// Minimum spacing between published estimates
    pub publish_interval_ms: u64,
    /// Largest population (in tickets) that gets a one-slot-per-ticket array
    pub ticket_array_cap: u64,
    /// Trials per worker report; chosen from population size when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// Decimal places kept in published estimates
    pub decimal_places: u32,
    /// Redispatch attempts after worker failures, per run
    pub max_retries: u32,
    pub default_trials: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: None,
            idle_timeout_ms: 15_000,
            publish_interval_ms: 16,
            ticket_array_cap: DEFAULT_TICKET_ARRAY_CAP,
            batch_size: None,
            decimal_places: 3,
            max_retries: 2,
            default_trials: 1000,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(cpu_parallelism)
            .max(1)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn batch_size_for(&self, total_applicants: u64) -> u32 {
        self.batch_size
            .unwrap_or_else(|| reporting_batch_size(total_applicants))
            .max(1)
    }

    /// Get the config file path
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join("config.yaml")
    }

    /// Default data directory (~/.drawsim/)
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".drawsim")
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_saphyr::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_saphyr::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Load the config from the data directory.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file is an error.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(data_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&content)
    }

    /// Load the config, falling back to defaults on any failure
    pub fn load_or_default(data_dir: &Path) -> Self {
        Self::load(data_dir).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring unreadable config");
            Self::default()
        })
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(data_dir).map_err(|e| ConfigError::Io(e.to_string()))?;
        let yaml = self.to_yaml()?;
        std::fs::write(Self::path(data_dir), yaml).map_err(|e| ConfigError::Io(e.to_string()))
    }
}

pub fn cpu_parallelism() -> usize {
    available_parallelism().map(|n| n.get()).unwrap_or(4)
}
