use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;

use parking_lot::Mutex;
use serde::Serialize;

use crate::bus::{ObservationBus, Subscription};
use crate::clock::SharedClock;
use crate::history::BoundedHistory;

/// Entries kept for the report
pub const MAX_PERFORMANCE_ENTRIES: usize = 100;

pub const MEASURE_ENTRY: &str = "measure";
pub const MARK_ENTRY: &str = "mark";

pub const DEFAULT_OBSERVED_TYPES: &[&str] = &[
    MEASURE_ENTRY,
    "navigation",
    "resource",
    "paint",
    "largest-contentful-paint",
    "first-input",
    "layout-shift",
];

/// One timeline entry: a navigation, resource fetch, paint or user measure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceEntry {
    pub name: String,
    pub entry_type: String,
    /// Monotonic milliseconds
    pub start_time: f64,
    pub duration: f64,
    /// Epoch milliseconds at record time
    pub timestamp: i64,
}

/// Bounded log of timeline entries plus the latest duration per user measure.
///
/// Only entries whose type is observed are kept in the log. `measure`
/// entries always update the user-timing map, observed or not.
pub struct EntryLog {
    clock: SharedClock,
    observed: HashSet<String>,
    state: Mutex<EntryState>,
    bus: ObservationBus<PerformanceEntry>,
}

struct EntryState {
    entries: BoundedHistory<PerformanceEntry>,
    user_timing: BTreeMap<String, f64>,
    marks: HashMap<String, f64>,
}

impl EntryLog {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_observed_types(clock, DEFAULT_OBSERVED_TYPES.iter().copied())
    }

    pub fn with_observed_types<I, S>(clock: SharedClock, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            clock,
            observed: types.into_iter().map(Into::into).collect(),
            state: Mutex::new(EntryState {
                entries: BoundedHistory::new(MAX_PERFORMANCE_ENTRIES),
                user_timing: BTreeMap::new(),
                marks: HashMap::new(),
            }),
            bus: ObservationBus::new(),
        }
    }

    pub fn observes(&self, entry_type: &str) -> bool {
        self.observed.contains(entry_type)
    }

    /// Record one entry. Returns true when it was kept in the log.
    /// Subscribers only see kept entries.
    pub fn record(&self, name: &str, entry_type: &str, start_time: f64, duration: f64) -> bool {
        let _order = self.bus.ordered();
        let entry = PerformanceEntry {
            name: name.to_owned(),
            entry_type: entry_type.to_owned(),
            start_time,
            duration: duration.max(0.0),
            timestamp: self.clock.epoch_ms(),
        };

        let kept = {
            let mut state = self.state.lock();
            if entry_type == MEASURE_ENTRY {
                state.user_timing.insert(entry.name.clone(), entry.duration);
            }
            let kept = self.observes(entry_type);
            if kept {
                state.entries.push(entry.clone());
            }
            kept
        };

        if kept {
            self.bus.notify(&entry);
        } else {
            tracing::trace!(entry_type, name, "entry type not observed");
        }
        kept
    }

    /// Remember the current time under `name` for a later `measure`.
    pub fn mark(&self, name: &str) {
        let now = self.clock.monotonic_ms();
        self.state.lock().marks.insert(name.to_owned(), now);
        self.record(name, MARK_ENTRY, now, 0.0);
    }

    /// Record a `measure` entry spanning two marks, or from `start_mark` to
    /// now. Returns the duration, or `None` when a mark is unknown.
    pub fn measure(&self, name: &str, start_mark: &str, end_mark: Option<&str>) -> Option<f64> {
        let (start, end) = {
            let state = self.state.lock();
            let start = *state.marks.get(start_mark)?;
            let end = match end_mark {
                Some(mark) => *state.marks.get(mark)?,
                None => self.clock.monotonic_ms(),
            };
            (start, end)
        };

        let duration = (end - start).max(0.0);
        self.record(name, MEASURE_ENTRY, start, duration);
        Some(duration)
    }

    /// Await `work` and record its duration as the `measure_<name>` user timing.
    pub async fn measure_user_timing<F: Future>(&self, name: &str, work: F) -> F::Output {
        let start = self.clock.monotonic_ms();
        let out = work.await;
        let duration = (self.clock.monotonic_ms() - start).max(0.0);
        self.record(&format!("measure_{name}"), MEASURE_ENTRY, start, duration);
        out
    }

    /// Oldest to newest.
    pub fn entries(&self) -> Vec<PerformanceEntry> {
        self.state.lock().entries.items()
    }

    pub fn entries_of_type(&self, entry_type: &str) -> Vec<PerformanceEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| e.entry_type == entry_type)
            .cloned()
            .collect()
    }

    pub fn user_timing(&self) -> BTreeMap<String, f64> {
        self.state.lock().user_timing.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.user_timing.clear();
        state.marks.clear();
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PerformanceEntry) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }
}
