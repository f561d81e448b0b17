use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use super::stats::ApiPerformanceStats;
use super::{ApiCallRecord, CallOutcome};
use crate::bus::{ObservationBus, Subscription};
use crate::clock::SharedClock;
use crate::history::BoundedHistory;

// ─── Configuration ───────────────────────────────────────────────

/// Default stats window: 5 minutes
pub const DEFAULT_WINDOW_MS: u64 = 300_000;

pub type CallHook = Arc<dyn Fn(&ApiCallRecord) + Send + Sync>;

#[derive(Clone)]
pub struct ApiMonitorOptions {
    /// Calls slower than this (ms) trigger `on_slow_call`
    pub slow_threshold_ms: f64,
    /// Error rate (%) above which the error budget counts as exceeded
    pub error_threshold_pct: f64,
    /// Ring buffer capacity
    pub max_history: usize,
    /// Window used by `stats()` and subscriber notifications
    pub window_ms: u64,
    pub on_slow_call: Option<CallHook>,
    pub on_error: Option<CallHook>,
}

impl Default for ApiMonitorOptions {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 1_000.0,
            error_threshold_pct: 10.0,
            max_history: 100,
            window_ms: DEFAULT_WINDOW_MS,
            on_slow_call: None,
            on_error: None,
        }
    }
}

impl ApiMonitorOptions {
    pub fn on_slow_call(mut self, hook: impl Fn(&ApiCallRecord) + Send + Sync + 'static) -> Self {
        self.on_slow_call = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&ApiCallRecord) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }
}

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe call-record buffer with windowed statistics.
/// Callers report completed calls through `record_call()`.
pub struct ApiCallMonitor {
    options: ApiMonitorOptions,
    clock: SharedClock,
    inner: Mutex<Inner>,
    bus: ObservationBus<ApiPerformanceStats>,
}

struct Inner {
    history: BoundedHistory<ApiCallRecord>,
    /// Calls reported with `end_time < start_time`
    malformed: u64,
}

// ─── ApiCallMonitor impl ─────────────────────────────────────────

impl ApiCallMonitor {
    pub fn new(options: ApiMonitorOptions, clock: SharedClock) -> Self {
        let capacity = options.max_history.max(1);
        Self {
            options,
            clock,
            inner: Mutex::new(Inner {
                history: BoundedHistory::new(capacity),
                malformed: 0,
            }),
            bus: ObservationBus::new(),
        }
    }

    pub fn options(&self) -> &ApiMonitorOptions {
        &self.options
    }

    /// Record a completed call. Never fails: a negative duration is clamped
    /// to zero and counted in `malformed_samples()`.
    pub fn record_call(&self, outcome: CallOutcome) -> ApiCallRecord {
        let _order = self.bus.ordered();
        let raw = outcome.end_time - outcome.start_time;
        let malformed = !(raw >= 0.0);
        if malformed {
            tracing::debug!(
                url = %outcome.url,
                start = outcome.start_time,
                end = outcome.end_time,
                "call ended before it started; clamping duration to 0"
            );
        }

        let record = ApiCallRecord {
            id: uuid::Uuid::new_v4().to_string(),
            url: outcome.url,
            method: outcome.method,
            start_time: outcome.start_time,
            end_time: outcome.end_time,
            duration: if malformed { 0.0 } else { raw },
            status: outcome.status,
            success: outcome.success,
            size: outcome.size,
            error: outcome.error,
            timestamp: self.clock.epoch_ms(),
        };

        let stats = {
            let mut inner = self.inner.lock();
            inner.history.push(record.clone());
            if malformed {
                inner.malformed += 1;
            }
            // Skip the computation nobody would see.
            (self.bus.subscriber_count() > 0).then(|| {
                ApiPerformanceStats::compute(inner.history.iter(), record.timestamp, self.options.window_ms)
            })
        };

        if let Some(stats) = stats {
            self.bus.notify(&stats);
        }

        if record.duration > self.options.slow_threshold_ms {
            tracing::warn!(
                url = %record.url,
                method = %record.method,
                "slow API call: {:.2}ms",
                record.duration
            );
            if let Some(hook) = &self.options.on_slow_call {
                hook(&record);
            }
        }

        if !record.success {
            if let Some(hook) = &self.options.on_error {
                hook(&record);
            }
        }

        record
    }

    /// Stats over the configured default window.
    pub fn stats(&self) -> ApiPerformanceStats {
        self.stats_for(self.options.window_ms)
    }

    pub fn stats_for(&self, window_ms: u64) -> ApiPerformanceStats {
        let now = self.clock.epoch_ms();
        let inner = self.inner.lock();
        ApiPerformanceStats::compute(inner.history.iter(), now, window_ms)
    }

    /// Error rate strictly above the configured threshold.
    pub fn error_budget_exceeded(&self, stats: &ApiPerformanceStats) -> bool {
        stats.has_data() && stats.error_rate > self.options.error_threshold_pct
    }

    /// Copy of the retained records, oldest first.
    pub fn history(&self) -> Vec<ApiCallRecord> {
        self.inner.lock().history.items()
    }

    pub fn malformed_samples(&self) -> u64 {
        self.inner.lock().malformed
    }

    /// Drop every record and notify subscribers with the emptied stats.
    pub fn clear(&self) {
        let _order = self.bus.ordered();
        {
            let mut inner = self.inner.lock();
            inner.history.clear();
            inner.malformed = 0;
        }
        self.bus.notify(&ApiPerformanceStats::empty(self.options.window_ms));
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ApiPerformanceStats) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    pub fn bus(&self) -> &ObservationBus<ApiPerformanceStats> {
        &self.bus
    }

    /// Time `call` and record its outcome. Errors are recorded with status 0
    /// and their display text, then handed back unchanged.
    pub async fn track<T, E, Fut>(&self, url: &str, method: &str, call: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let start = self.clock.monotonic_ms();
        let result = call.await;
        let end = self.clock.monotonic_ms();

        let outcome = match &result {
            Ok(_) => CallOutcome::success(url, method, start, end, 200),
            Err(e) => CallOutcome::failure(url, method, start, end, 0, e.to_string()),
        };
        self.record_call(outcome);

        result
    }
}
