//! Optimizer configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Collect a trace of every rewrite.
    pub trace: bool,
    /// Row count assumed for a table without statistics.
    pub default_row_count: f64,
    /// NDV of a column without statistics, as a fraction of the row count.
    pub distinct_factor: f64,
    /// Selectivity of a condition that statistics cannot estimate.
    pub selection_factor: f64,
    /// Rule names to enable; `None` enables the whole registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<String>>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            trace: false,
            default_row_count: 10_000.0,
            distinct_factor: 0.8,
            selection_factor: 0.8,
            rules: None,
        }
    }
}

impl OptimizerConfig {
    /// Defaults overridden by `QOPT_*` environment variables. Unparseable
    /// values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("QOPT_TRACE") {
            config.trace = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes");
        }
        if let Some(v) = env_f64("QOPT_DEFAULT_ROW_COUNT") {
            config.default_row_count = v;
        }
        if let Some(v) = env_f64("QOPT_DISTINCT_FACTOR") {
            config.distinct_factor = v;
        }
        if let Some(v) = env_f64("QOPT_SELECTION_FACTOR") {
            config.selection_factor = v;
        }
        if let Ok(v) = std::env::var("QOPT_RULES") {
            let names: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            config.rules = Some(names);
        }
        config
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.default_row_count > 0.0) {
            return Err(Error::Config(format!(
                "default_row_count must be positive, got {}",
                self.default_row_count
            )));
        }
        for (name, v) in [
            ("distinct_factor", self.distinct_factor),
            ("selection_factor", self.selection_factor),
        ] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(Error::Config(format!("{name} must be in (0, 1], got {v}")));
            }
        }
        Ok(())
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
