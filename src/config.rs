use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::ApiMonitorOptions;
use crate::error::{Result, TelemetryError};
use crate::memory::MemorySamplerOptions;
use crate::metrics::{RatingThreshold, RatingThresholds};

// ─── Config document ─────────────────────────────────────────────

/// Every field has a default, so `{}` is a valid document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub collection: CollectionConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    /// Extra or overriding rating thresholds, keyed by metric name
    #[serde(default)]
    pub vitals: BTreeMap<String, RatingThreshold>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Slow-render bound (ms); 16 ms is one frame at 60 fps
    #[serde(default = "default_render_ms")]
    pub render_ms: f64,

    #[serde(default = "default_mount_ms")]
    pub mount_ms: f64,

    #[serde(default = "default_api_slow_ms")]
    pub api_slow_ms: f64,

    /// Usage % of the memory limit
    #[serde(default = "default_memory_warning_pct")]
    pub memory_warning_pct: f64,

    #[serde(default = "default_memory_critical_pct")]
    pub memory_critical_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_memory_interval_ms")]
    pub memory_interval_ms: u64,

    #[serde(default = "default_api_history_size")]
    pub api_history_size: usize,

    #[serde(default = "default_api_window_ms")]
    pub api_window_ms: u64,

    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// API error rate (%) treated as over budget
    #[serde(default = "default_error_rate_pct")]
    pub error_rate_pct: f64,
}

fn default_render_ms() -> f64 {
    16.0
}
fn default_mount_ms() -> f64 {
    100.0
}
fn default_api_slow_ms() -> f64 {
    1_000.0
}
fn default_memory_warning_pct() -> f64 {
    70.0
}
fn default_memory_critical_pct() -> f64 {
    90.0
}
fn default_memory_interval_ms() -> u64 {
    5_000
}
fn default_api_history_size() -> usize {
    100
}
fn default_api_window_ms() -> u64 {
    300_000
}
fn default_report_interval_ms() -> u64 {
    5_000
}
fn default_error_rate_pct() -> f64 {
    10.0
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            render_ms: default_render_ms(),
            mount_ms: default_mount_ms(),
            api_slow_ms: default_api_slow_ms(),
            memory_warning_pct: default_memory_warning_pct(),
            memory_critical_pct: default_memory_critical_pct(),
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            memory_interval_ms: default_memory_interval_ms(),
            api_history_size: default_api_history_size(),
            api_window_ms: default_api_window_ms(),
            report_interval_ms: default_report_interval_ms(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            error_rate_pct: default_error_rate_pct(),
        }
    }
}

// ─── Loading & validation ────────────────────────────────────────

fn invalid(msg: impl Into<String>) -> TelemetryError {
    TelemetryError::InvalidConfig(msg.into())
}

impl TelemetryConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(1.0..=1_000.0).contains(&t.render_ms) {
            return Err(invalid("render_ms must be between 1 and 1000"));
        }
        if t.mount_ms <= 0.0 || t.api_slow_ms <= 0.0 {
            return Err(invalid("mount_ms and api_slow_ms must be positive"));
        }
        if !(50.0..=100.0).contains(&t.memory_warning_pct) {
            return Err(invalid("memory_warning_pct must be between 50 and 100"));
        }
        if t.memory_critical_pct > 100.0 || t.memory_warning_pct >= t.memory_critical_pct {
            return Err(invalid(
                "memory_critical_pct must exceed memory_warning_pct and be at most 100",
            ));
        }

        let c = &self.collection;
        if !(1_000..=30_000).contains(&c.memory_interval_ms) {
            return Err(invalid("memory_interval_ms must be between 1000 and 30000"));
        }
        if !(10..=1_000).contains(&c.api_history_size) {
            return Err(invalid("api_history_size must be between 10 and 1000"));
        }
        if c.api_window_ms == 0 || c.report_interval_ms == 0 {
            return Err(invalid("api_window_ms and report_interval_ms must be positive"));
        }

        if !(0.0..=100.0).contains(&self.alerts.error_rate_pct) {
            return Err(invalid("error_rate_pct must be between 0 and 100"));
        }

        self.rating_thresholds().validate()
    }

    /// Core Web Vitals table with `vitals` entries layered on top.
    pub fn rating_thresholds(&self) -> RatingThresholds {
        let mut table = RatingThresholds::core_web_vitals();
        for (name, threshold) in &self.vitals {
            table.insert(name.clone(), *threshold);
        }
        table
    }

    /// Monitor options without callbacks; the registry attaches those.
    pub fn api_options(&self) -> ApiMonitorOptions {
        ApiMonitorOptions {
            slow_threshold_ms: self.thresholds.api_slow_ms,
            error_threshold_pct: self.alerts.error_rate_pct,
            max_history: self.collection.api_history_size,
            window_ms: self.collection.api_window_ms,
            ..Default::default()
        }
    }

    pub fn memory_options(&self) -> MemorySamplerOptions {
        MemorySamplerOptions {
            warning_threshold: self.thresholds.memory_warning_pct,
            critical_threshold: self.thresholds.memory_critical_pct,
            ..Default::default()
        }
    }

    pub fn memory_interval(&self) -> Duration {
        Duration::from_millis(self.collection.memory_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.collection.report_interval_ms)
    }
}
