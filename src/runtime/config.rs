//! Runtime configuration
//!
//! Configuration is plain serde data. It can be read from a JSON file and
//! overridden from the environment, which is how the native entry point
//! picks up settings without a configuration channel of its own.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::thread;

use super::error::{Result, RuntimeError};

/// Environment variable overriding [`RuntimeConfig::workers`]
pub const WORKERS_ENV: &str = "CANOPY_WORKERS";

/// Environment variable overriding [`RuntimeConfig::debug`]
pub const DEBUG_ENV: &str = "CANOPY_DEBUG";

/// Configuration for the canopy runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads in the pool (0: one per available CPU)
    pub workers: usize,

    /// Prefix for worker thread names
    pub thread_name: String,

    /// Emit a trace event for every turn
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            thread_name: "canopy-worker".to_string(),
            debug: false,
        }
    }
}

impl RuntimeConfig {
    /// Number of workers to start, resolving 0 to the CPU count
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Apply `CANOPY_WORKERS` / `CANOPY_DEBUG` from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(WORKERS_ENV) {
            self.workers = raw.trim().parse().map_err(|_| {
                RuntimeError::Config(format!("{} must be a worker count, got {:?}", WORKERS_ENV, raw))
            })?;
        }
        if let Some(raw) = lookup(DEBUG_ENV) {
            self.debug = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(RuntimeError::Config(format!(
                        "{} must be a boolean, got {:?}",
                        DEBUG_ENV, raw
                    )));
                }
            };
        }
        Ok(self)
    }
}

/// Load a configuration file
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Write a configuration file
pub fn write_config(path: &Path, config: &RuntimeConfig) -> Result<()> {
    let data = serde_json::to_string_pretty(config)?;
    fs::write(path, data)?;
    Ok(())
}
