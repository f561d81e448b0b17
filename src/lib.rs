//! In-process performance telemetry: web-vital ratings, API call latency
//! statistics, memory pressure sampling, render/mount timings and user
//! timing entries, rolled up
//! into point-in-time reports.

pub mod api;
pub mod bus;
pub mod clock;
pub mod config;
pub mod entries;
pub mod error;
pub mod history;
pub mod issues;
pub mod memory;
pub mod metrics;
pub mod registry;
pub mod report;
pub mod timing;

pub use api::{ApiCallMonitor, ApiCallRecord, ApiMonitorOptions, ApiPerformanceStats, CallOutcome};
pub use bus::{ObservationBus, Subscription};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::TelemetryConfig;
pub use entries::{EntryLog, PerformanceEntry};
pub use error::{Result, TelemetryError};
pub use issues::{IssueKind, IssueLog, PerformanceIssue};
pub use memory::{
    LeakDetector, MemoryReading, MemorySampler, MemorySignal, MemorySignalSource, NoMemorySignal,
    PressureLevel, RawMemoryReading,
};
pub use metrics::{classify, MetricAlert, MetricCollector, MetricSample, Rating, RatingThresholds, VitalsSummary};
pub use registry::Telemetry;
pub use report::{ExportDestination, ExportOutcome, Report, ReportAggregator, ReportSink, ReportTask, TracingSink};
pub use timing::{TimingKind, TimingStats, TimingTracker};
