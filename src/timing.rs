use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::bus::{ObservationBus, Subscription};
use crate::clock::SharedClock;
use crate::history::BoundedHistory;

/// Rolling window per named unit
pub const TIMING_HISTORY_SIZE: usize = 10;

/// One frame at 60 fps
pub const RENDER_THRESHOLD_MS: f64 = 16.0;
pub const MOUNT_THRESHOLD_MS: f64 = 100.0;

// ─── Public types ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingKind {
    Render,
    Mount,
    Custom,
}

impl fmt::Display for TimingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimingKind::Render => "render",
            TimingKind::Mount => "mount",
            TimingKind::Custom => "custom",
        })
    }
}

/// Passed to `on_slow` when a measurement exceeds the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowTiming {
    pub kind: TimingKind,
    pub name: String,
    pub elapsed_ms: f64,
    pub average_ms: f64,
    pub threshold_ms: f64,
}

pub type SlowHook = Arc<dyn Fn(&SlowTiming) + Send + Sync>;

/// Read-only view of one unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingStats {
    pub name: String,
    pub last_ms: f64,
    pub average_ms: f64,
    /// Completed measurements since the last reset
    pub count: u64,
    pub slow_count: u64,
    pub is_slow: bool,
    pub history: Vec<f64>,
}

/// Per-unit elapsed-time recorder with a bounded rolling average.
///
/// `begin`/`end` pairs are keyed by name. An `end` with no matching `begin`
/// is tolerated: overlapping lifecycles are normal for UI components.
pub struct TimingTracker {
    kind: TimingKind,
    threshold_ms: f64,
    on_slow: Option<SlowHook>,
    clock: SharedClock,
    units: Mutex<HashMap<String, Unit>>,
    bus: ObservationBus<TimingStats>,
}

struct Unit {
    started_at: Option<f64>,
    history: BoundedHistory<f64>,
    last_ms: f64,
    average_ms: f64,
    count: u64,
    slow_count: u64,
    is_slow: bool,
}

impl Unit {
    fn new() -> Self {
        Self {
            started_at: None,
            history: BoundedHistory::new(TIMING_HISTORY_SIZE),
            last_ms: 0.0,
            average_ms: 0.0,
            count: 0,
            slow_count: 0,
            is_slow: false,
        }
    }

    fn stats(&self, name: &str) -> TimingStats {
        TimingStats {
            name: name.to_owned(),
            last_ms: self.last_ms,
            average_ms: self.average_ms,
            count: self.count,
            slow_count: self.slow_count,
            is_slow: self.is_slow,
            history: self.history.items(),
        }
    }
}

// ─── TimingTracker impl ──────────────────────────────────────────

impl TimingTracker {
    pub fn new(kind: TimingKind, threshold_ms: f64, clock: SharedClock) -> Self {
        Self {
            kind,
            threshold_ms,
            on_slow: None,
            clock,
            units: Mutex::new(HashMap::new()),
            bus: ObservationBus::new(),
        }
    }

    pub fn render(clock: SharedClock) -> Self {
        Self::new(TimingKind::Render, RENDER_THRESHOLD_MS, clock)
    }

    pub fn mount(clock: SharedClock) -> Self {
        Self::new(TimingKind::Mount, MOUNT_THRESHOLD_MS, clock)
    }

    pub fn with_threshold(mut self, threshold_ms: f64) -> Self {
        self.threshold_ms = threshold_ms;
        self
    }

    pub fn on_slow(mut self, hook: impl Fn(&SlowTiming) + Send + Sync + 'static) -> Self {
        self.on_slow = Some(Arc::new(hook));
        self
    }

    pub fn kind(&self) -> TimingKind {
        self.kind
    }

    pub fn threshold_ms(&self) -> f64 {
        self.threshold_ms
    }

    pub fn begin(&self, name: &str) {
        let now = self.clock.monotonic_ms();
        self.units
            .lock()
            .entry(name.to_owned())
            .or_insert_with(Unit::new)
            .started_at = Some(now);
    }

    /// Close the open measurement for `name` and return its elapsed time.
    /// Returns 0 without touching any state when `begin` was not called.
    pub fn end(&self, name: &str) -> f64 {
        let now = self.clock.monotonic_ms();
        let started = self
            .units
            .lock()
            .get_mut(name)
            .and_then(|unit| unit.started_at.take());

        match started {
            Some(start) => {
                let elapsed = (now - start).max(0.0);
                self.record(name, elapsed);
                elapsed
            }
            None => {
                tracing::debug!(kind = %self.kind, unit = name, "end() without begin(); ignoring");
                0.0
            }
        }
    }

    /// Time a closure as one measurement of `name`.
    pub fn measure<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let start = self.clock.monotonic_ms();
        let out = f();
        let elapsed = (self.clock.monotonic_ms() - start).max(0.0);
        self.record(name, elapsed);
        out
    }

    /// Await `work` as one measurement of `name`.
    pub async fn measure_async<F: Future>(&self, name: &str, work: F) -> F::Output {
        let start = self.clock.monotonic_ms();
        let out = work.await;
        let elapsed = (self.clock.monotonic_ms() - start).max(0.0);
        self.record(name, elapsed);
        out
    }

    /// Add an externally measured elapsed time for `name`.
    pub fn record(&self, name: &str, elapsed_ms: f64) {
        let _order = self.bus.ordered();
        let (stats, slow) = {
            let mut units = self.units.lock();
            let unit = units.entry(name.to_owned()).or_insert_with(Unit::new);

            unit.history.push(elapsed_ms);
            unit.last_ms = elapsed_ms;
            unit.average_ms = unit.history.iter().sum::<f64>() / unit.history.len() as f64;
            unit.count += 1;
            unit.is_slow = elapsed_ms > self.threshold_ms;

            let slow = unit.is_slow.then(|| {
                unit.slow_count += 1;
                SlowTiming {
                    kind: self.kind,
                    name: name.to_owned(),
                    elapsed_ms,
                    average_ms: unit.average_ms,
                    threshold_ms: self.threshold_ms,
                }
            });
            (unit.stats(name), slow)
        };

        if let Some(event) = slow {
            tracing::warn!(
                kind = %self.kind,
                unit = name,
                "slow {} in {name}: {elapsed_ms:.2}ms",
                self.kind
            );
            if let Some(hook) = &self.on_slow {
                hook(&event);
            }
        }

        self.bus.notify(&stats);
    }

    pub fn stats(&self, name: &str) -> Option<TimingStats> {
        self.units.lock().get(name).map(|unit| unit.stats(name))
    }

    /// Units that completed at least one measurement, by name.
    pub fn snapshot(&self) -> BTreeMap<String, TimingStats> {
        self.units
            .lock()
            .iter()
            .filter(|(_, unit)| unit.count > 0)
            .map(|(name, unit)| (name.clone(), unit.stats(name)))
            .collect()
    }

    pub fn reset(&self) {
        self.units.lock().clear();
    }

    pub fn reset_unit(&self, name: &str) {
        self.units.lock().remove(name);
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TimingStats) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_begin_end_records_elapsed() {
        let clock = ManualClock::shared(0);
        let t = TimingTracker::render(clock.clone());

        t.begin("ContractList");
        clock.advance(8.0);
        assert_eq!(t.end("ContractList"), 8.0);

        let s = t.stats("ContractList").unwrap();
        assert_eq!(s.last_ms, 8.0);
        assert_eq!(s.average_ms, 8.0);
        assert_eq!(s.count, 1);
        assert!(!s.is_slow);
    }

    #[test]
    fn test_end_without_begin_is_a_noop() {
        let clock = ManualClock::shared(0);
        let t = TimingTracker::render(clock.clone());

        assert_eq!(t.end("Ghost"), 0.0);
        assert!(t.stats("Ghost").is_none());

        t.begin("Form");
        clock.advance(4.0);
        t.end("Form");
        assert_eq!(t.end("Form"), 0.0);

        let s = t.stats("Form").unwrap();
        assert_eq!(s.average_ms, 4.0);
        assert_eq!(s.count, 1);
    }

    #[test]
    fn test_rolling_average_is_bounded() {
        let t = TimingTracker::render(ManualClock::shared(0));
        for i in 0..20 {
            t.record("Grid", i as f64);
        }

        let s = t.stats("Grid").unwrap();
        assert_eq!(s.history.len(), TIMING_HISTORY_SIZE);
        // last ten values: 10..=19
        assert_eq!(s.average_ms, 14.5);
        assert_eq!(s.count, 20);
    }

    #[test]
    fn test_slow_hook_fires_above_threshold() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let t = TimingTracker::mount(ManualClock::shared(0))
            .on_slow(move |e: &SlowTiming| s.lock().push((e.name.clone(), e.elapsed_ms)));

        t.record("Dashboard", 100.0);
        t.record("Dashboard", 150.0);

        assert_eq!(*seen.lock(), vec![("Dashboard".to_string(), 150.0)]);
        let stats = t.stats("Dashboard").unwrap();
        assert!(stats.is_slow);
        assert_eq!(stats.slow_count, 1);
    }

    #[test]
    fn test_measure_closure() {
        let clock = ManualClock::shared(0);
        let t = TimingTracker::new(TimingKind::Custom, 5.0, clock.clone());

        let out = t.measure("parse", || {
            clock.advance(3.0);
            42
        });

        assert_eq!(out, 42);
        assert_eq!(t.stats("parse").unwrap().last_ms, 3.0);
    }

    #[tokio::test]
    async fn test_measure_async_future() {
        let clock = ManualClock::shared(0);
        let t = TimingTracker::mount(clock.clone());

        let out = t
            .measure_async("Dashboard", async {
                clock.advance(120.0);
                7
            })
            .await;

        assert_eq!(out, 7);
        let stats = t.stats("Dashboard").unwrap();
        assert_eq!(stats.last_ms, 120.0);
        assert!(stats.is_slow);
    }

    #[test]
    fn test_reset_clears_everything() {
        let t = TimingTracker::render(ManualClock::shared(0));
        t.record("A", 1.0);
        t.record("B", 2.0);
        t.reset_unit("A");
        assert!(t.stats("A").is_none());
        assert_eq!(t.snapshot().len(), 1);

        t.reset();
        assert!(t.snapshot().is_empty());
    }

    #[test]
    fn test_concurrent_records_keep_counts() {
        let t = TimingTracker::render(ManualClock::shared(0));
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let d = delivered.clone();
        t.subscribe(move |s: &TimingStats| d.lock().push(s.count));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for i in 0..200 {
                        t.record("List", i as f64 % 20.0);
                    }
                });
            }
        });

        let stats = t.stats("List").unwrap();
        assert_eq!(stats.count, 1_600);
        assert_eq!(stats.history.len(), TIMING_HISTORY_SIZE);

        let delivered = delivered.lock();
        assert_eq!(delivered.len(), 1_600);
        assert_eq!(delivered.last().copied(), Some(1_600));
        assert!(delivered.windows(2).all(|w| w[0] < w[1]));
    }
}
