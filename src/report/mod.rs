pub mod aggregator;
pub mod render;
pub mod stream;

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::ApiPerformanceStats;
use crate::entries::PerformanceEntry;
use crate::error::TelemetryError;
use crate::issues::PerformanceIssue;
use crate::memory::MemoryReading;
use crate::metrics::{MetricSample, VitalsSummary};
use crate::timing::TimingStats;

pub use aggregator::ReportAggregator;
pub use stream::ReportTask;

/// Point-in-time copy of every registered collector.
/// Sections for unregistered collectors are `None` / empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub captured_at: DateTime<Utc>,
    pub vitals: Option<VitalsSummary>,
    pub vital_samples: BTreeMap<String, MetricSample>,
    pub api: Option<ApiPerformanceStats>,
    pub api_error_budget_exceeded: bool,
    pub api_malformed_samples: u64,
    pub memory: Option<MemoryStatus>,
    pub render: BTreeMap<String, TimingStats>,
    pub mount: BTreeMap<String, TimingStats>,
    /// Latest duration per user measure
    pub user_timing: BTreeMap<String, f64>,
    /// Oldest first
    pub performance_entries: Vec<PerformanceEntry>,
    /// Newest first
    pub issues: Vec<PerformanceIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStatus {
    pub supported: bool,
    pub sampling: bool,
    pub leaking: bool,
    pub latest: Option<MemoryReading>,
}

// ─── Export ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportDestination {
    /// One tabular line per metric, handed to the `ReportSink`
    StructuredLog,
    /// The `Report` itself, for programmatic use
    Memory,
}

impl FromStr for ExportDestination {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structured-log" => Ok(Self::StructuredLog),
            "memory" => Ok(Self::Memory),
            other => Err(TelemetryError::InvalidConfig(format!(
                "unknown export destination: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    /// Lines emitted to the sink, in order
    Logged(Vec<String>),
    Report(Box<Report>),
}

/// Receives rendered report lines.
pub trait ReportSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Emits each line as a `tracing` info event under `perf_telemetry::report`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn emit(&self, line: &str) {
        tracing::info!(target: "perf_telemetry::report", "{line}");
    }
}
