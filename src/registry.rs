use std::sync::Arc;

use crate::api::ApiCallMonitor;
use crate::bus::Subscription;
use crate::clock::{SharedClock, SystemClock};
use crate::config::TelemetryConfig;
use crate::entries::EntryLog;
use crate::error::Result;
use crate::issues::{IssueKind, IssueLog};
use crate::memory::{LeakDetector, MemorySampler, MemorySignalSource, NoMemorySignal};
use crate::metrics::MetricCollector;
use crate::report::{ExportDestination, Report, ReportAggregator, ReportTask};
use crate::timing::{SlowTiming, TimingKind, TimingTracker};

// ─── Shared state ────────────────────────────────────────────────

/// One instance of every collector, wired together.
///
/// Slow renders, slow mounts, slow or failed API calls, memory pressure and
/// leak suspicion all land in the shared `IssueLog`. Hand out clones of the
/// `Arc`s to whatever produces the measurements.
pub struct Telemetry {
    config: TelemetryConfig,
    clock: SharedClock,
    vitals: Arc<MetricCollector>,
    api: Arc<ApiCallMonitor>,
    memory: Arc<MemorySampler>,
    leak: Arc<LeakDetector>,
    render: Arc<TimingTracker>,
    mount: Arc<TimingTracker>,
    issues: Arc<IssueLog>,
    entries: Arc<EntryLog>,
    reports: Arc<ReportAggregator>,
    _leak_watch: Subscription,
}

impl Telemetry {
    /// Wall clock and no memory signal.
    pub fn new(config: TelemetryConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::shared(), Arc::new(NoMemorySignal))
    }

    pub fn with_clock(
        config: TelemetryConfig,
        clock: SharedClock,
        source: Arc<dyn MemorySignalSource>,
    ) -> Result<Self> {
        config.validate()?;

        let issues = Arc::new(IssueLog::new(clock.clone()));

        let vitals = Arc::new(MetricCollector::new(config.rating_thresholds(), clock.clone()));

        let api_options = {
            let slow = issues.clone();
            let failed = issues.clone();
            config
                .api_options()
                .on_slow_call(move |call| {
                    slow.push(
                        IssueKind::SlowApi,
                        format!("Slow API call: {} took {:.2}ms", call.url, call.duration),
                    );
                })
                .on_error(move |call| {
                    let reason = call.error.as_deref().unwrap_or("request failed");
                    failed.push(
                        IssueKind::ApiError,
                        format!("API error: {} {} ({}) {reason}", call.method, call.url, call.status),
                    );
                })
        };
        let api = Arc::new(ApiCallMonitor::new(api_options, clock.clone()));

        let memory_options = {
            let pressure = issues.clone();
            config.memory_options().on_memory_warning(move |reading| {
                pressure.push(
                    IssueKind::MemoryPressure,
                    format!(
                        "Memory usage: {:.1}% ({})",
                        reading.usage_percent,
                        reading.pressure.as_str()
                    ),
                );
            })
        };
        let memory = Arc::new(MemorySampler::new(memory_options, source, clock.clone()));

        let leak = Arc::new(LeakDetector::new());
        let leak_watch = {
            let leak = leak.clone();
            let issues = issues.clone();
            memory.subscribe(move |reading| {
                let was_leaking = leak.is_leaking();
                if leak.observe(reading) && !was_leaking {
                    issues.push(
                        IssueKind::MemoryLeak,
                        format!(
                            "Potential memory leak detected: {:.2} MB/s growth",
                            reading.growth_rate
                        ),
                    );
                }
            })
        };

        let render = Arc::new(
            TimingTracker::new(TimingKind::Render, config.thresholds.render_ms, clock.clone())
                .on_slow(slow_timing_hook(issues.clone(), IssueKind::SlowRender)),
        );
        let mount = Arc::new(
            TimingTracker::new(TimingKind::Mount, config.thresholds.mount_ms, clock.clone())
                .on_slow(slow_timing_hook(issues.clone(), IssueKind::SlowMount)),
        );

        let entries = Arc::new(EntryLog::new(clock.clone()));

        let reports = Arc::new(
            ReportAggregator::new(clock.clone())
                .with_entries(entries.clone())
                .with_vitals(vitals.clone())
                .with_api(api.clone())
                .with_memory(memory.clone(), leak.clone())
                .with_render(render.clone())
                .with_mount(mount.clone())
                .with_issues(issues.clone()),
        );

        tracing::debug!("telemetry registry ready");

        Ok(Self {
            config,
            clock,
            vitals,
            api,
            memory,
            leak,
            render,
            mount,
            issues,
            entries,
            reports,
            _leak_watch: leak_watch,
        })
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn vitals(&self) -> &Arc<MetricCollector> {
        &self.vitals
    }

    pub fn api(&self) -> &Arc<ApiCallMonitor> {
        &self.api
    }

    pub fn memory(&self) -> &Arc<MemorySampler> {
        &self.memory
    }

    pub fn leak_detector(&self) -> &Arc<LeakDetector> {
        &self.leak
    }

    pub fn render(&self) -> &Arc<TimingTracker> {
        &self.render
    }

    pub fn mount(&self) -> &Arc<TimingTracker> {
        &self.mount
    }

    pub fn issues(&self) -> &Arc<IssueLog> {
        &self.issues
    }

    pub fn entries(&self) -> &Arc<EntryLog> {
        &self.entries
    }

    pub fn reports(&self) -> &Arc<ReportAggregator> {
        &self.reports
    }

    pub fn snapshot(&self) -> Report {
        self.reports.snapshot()
    }

    /// Start the memory sampler at the configured interval.
    pub fn start_memory_sampling(&self) -> Result<()> {
        self.memory.start(self.config.memory_interval())
    }

    pub fn stop_memory_sampling(&self) {
        self.memory.stop();
    }

    /// Export at the configured report interval until the task is stopped.
    pub fn spawn_reports(&self, destination: ExportDestination) -> Result<ReportTask> {
        self.reports
            .spawn_periodic(self.config.report_interval(), destination)
    }

    /// Drop every recorded sample, timing and issue. Sampling keeps running.
    pub fn clear(&self) {
        self.vitals.clear();
        self.api.clear();
        self.memory.clear();
        self.leak.reset();
        self.render.reset();
        self.mount.reset();
        self.issues.clear();
        self.entries.clear();
        tracing::debug!("telemetry cleared");
    }
}

fn slow_timing_hook(issues: Arc<IssueLog>, kind: IssueKind) -> impl Fn(&SlowTiming) + Send + Sync {
    move |event| {
        issues.push(
            kind,
            format!("Slow {} in {}: {:.2}ms", event.kind, event.name, event.elapsed_ms),
        );
    }
}
