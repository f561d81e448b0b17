use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use super::render::render_lines;
use super::{ExportDestination, ExportOutcome, MemoryStatus, Report, ReportSink, TracingSink};
use crate::api::ApiCallMonitor;
use crate::bus::{ObservationBus, Subscription};
use crate::clock::SharedClock;
use crate::entries::EntryLog;
use crate::issues::IssueLog;
use crate::memory::{LeakDetector, MemorySampler};
use crate::metrics::MetricCollector;
use crate::timing::TimingTracker;

/// Reads the current state of every registered collector into a `Report`.
///
/// Holds shared handles only; it never mutates a collector.
pub struct ReportAggregator {
    clock: SharedClock,
    vitals: Option<Arc<MetricCollector>>,
    api: Option<Arc<ApiCallMonitor>>,
    memory: Option<Arc<MemorySampler>>,
    leak: Option<Arc<LeakDetector>>,
    render: Option<Arc<TimingTracker>>,
    mount: Option<Arc<TimingTracker>>,
    issues: Option<Arc<IssueLog>>,
    entries: Option<Arc<EntryLog>>,
    sink: Arc<dyn ReportSink>,
    bus: ObservationBus<Report>,
}

impl ReportAggregator {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            vitals: None,
            api: None,
            memory: None,
            leak: None,
            render: None,
            mount: None,
            issues: None,
            entries: None,
            sink: Arc::new(TracingSink),
            bus: ObservationBus::new(),
        }
    }

    pub fn with_vitals(mut self, vitals: Arc<MetricCollector>) -> Self {
        self.vitals = Some(vitals);
        self
    }

    pub fn with_api(mut self, api: Arc<ApiCallMonitor>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_memory(mut self, sampler: Arc<MemorySampler>, leak: Arc<LeakDetector>) -> Self {
        self.memory = Some(sampler);
        self.leak = Some(leak);
        self
    }

    pub fn with_render(mut self, render: Arc<TimingTracker>) -> Self {
        self.render = Some(render);
        self
    }

    pub fn with_mount(mut self, mount: Arc<TimingTracker>) -> Self {
        self.mount = Some(mount);
        self
    }

    pub fn with_issues(mut self, issues: Arc<IssueLog>) -> Self {
        self.issues = Some(issues);
        self
    }

    pub fn with_entries(mut self, entries: Arc<EntryLog>) -> Self {
        self.entries = Some(entries);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn snapshot(&self) -> Report {
        let captured_at = Utc
            .timestamp_millis_opt(self.clock.epoch_ms())
            .single()
            .unwrap_or_default();

        let (api, api_error_budget_exceeded, api_malformed_samples) = match &self.api {
            Some(monitor) => {
                let stats = monitor.stats();
                let exceeded = monitor.error_budget_exceeded(&stats);
                (Some(stats), exceeded, monitor.malformed_samples())
            }
            None => (None, false, 0),
        };

        let memory = self.memory.as_ref().map(|sampler| MemoryStatus {
            supported: sampler.is_supported(),
            sampling: sampler.is_sampling(),
            leaking: self.leak.as_ref().is_some_and(|l| l.is_leaking()),
            latest: sampler.latest(),
        });

        Report {
            captured_at,
            vitals: self.vitals.as_ref().map(|v| v.summary()),
            vital_samples: self
                .vitals
                .as_ref()
                .map(|v| v.snapshot())
                .unwrap_or_default(),
            api,
            api_error_budget_exceeded,
            api_malformed_samples,
            memory,
            render: timings(&self.render),
            mount: timings(&self.mount),
            user_timing: self
                .entries
                .as_ref()
                .map(|e| e.user_timing())
                .unwrap_or_default(),
            performance_entries: self
                .entries
                .as_ref()
                .map(|e| e.entries())
                .unwrap_or_default(),
            issues: self.issues.as_ref().map(|i| i.recent()).unwrap_or_default(),
        }
    }

    /// Take a snapshot and deliver it to `destination`.
    pub fn export(&self, destination: ExportDestination) -> ExportOutcome {
        self.export_report(self.snapshot(), destination)
    }

    /// Deliver an existing report. Subscribers see every exported report.
    pub fn export_report(&self, report: Report, destination: ExportDestination) -> ExportOutcome {
        let _order = self.bus.ordered();
        self.bus.notify(&report);
        match destination {
            ExportDestination::StructuredLog => {
                let lines = render_lines(&report);
                for line in &lines {
                    self.sink.emit(line);
                }
                ExportOutcome::Logged(lines)
            }
            ExportDestination::Memory => ExportOutcome::Report(Box::new(report)),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Report) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    pub fn bus(&self) -> &ObservationBus<Report> {
        &self.bus
    }
}

fn timings(tracker: &Option<Arc<TimingTracker>>) -> BTreeMap<String, crate::timing::TimingStats> {
    tracker.as_ref().map(|t| t.snapshot()).unwrap_or_default()
}
