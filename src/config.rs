//! File-backed settings. Every field has a default, so an empty file (or no
//! file) is a valid configuration.

use crate::error::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_REPORT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_HIGHLIGHT_DELAY_MS: u64 = 3_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Base URL of the report collector, e.g. `http://localhost:5000`.
    pub report_endpoint: Option<String>,
    pub report_timeout_ms: u64,
    pub highlight_delay_ms: u64,
    /// Alt text stubbed onto images during enhancement. Unset leaves alt alone.
    pub stub_alt_text: Option<String>,
    /// JSONL trace of scan and enhancement events.
    pub debug_log: Option<PathBuf>,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Rule keys (or reported rule ids) to skip.
    pub disabled_rules: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            report_endpoint: None,
            report_timeout_ms: DEFAULT_REPORT_TIMEOUT_MS,
            highlight_delay_ms: DEFAULT_HIGHLIGHT_DELAY_MS,
            stub_alt_text: None,
            debug_log: None,
            log_level: "info".to_string(),
            disabled_rules: Vec::new(),
        }
    }
}

impl TrackerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| TrackerError::InvalidConfiguration(err.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|err| match err {
            TrackerError::InvalidConfiguration(message) => {
                TrackerError::InvalidConfiguration(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|err| TrackerError::InvalidConfiguration(err.to_string()))
    }
}
