use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;

use crate::bus::{ObservationBus, Subscription};
use crate::clock::SharedClock;
use crate::history::BoundedHistory;

/// Issues kept for the report
pub const MAX_ISSUES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    SlowRender,
    SlowMount,
    SlowApi,
    ApiError,
    MemoryPressure,
    MemoryLeak,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueKind::SlowRender => "slow_render",
            IssueKind::SlowMount => "slow_mount",
            IssueKind::SlowApi => "slow_api",
            IssueKind::ApiError => "api_error",
            IssueKind::MemoryPressure => "memory_pressure",
            IssueKind::MemoryLeak => "memory_leak",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceIssue {
    pub kind: IssueKind,
    pub message: String,
    pub timestamp: i64,
}

/// Most recent performance issues raised by any collector.
pub struct IssueLog {
    clock: SharedClock,
    issues: Mutex<BoundedHistory<PerformanceIssue>>,
    bus: ObservationBus<PerformanceIssue>,
}

impl IssueLog {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            issues: Mutex::new(BoundedHistory::new(MAX_ISSUES)),
            bus: ObservationBus::new(),
        }
    }

    pub fn push(&self, kind: IssueKind, message: impl Into<String>) -> PerformanceIssue {
        let _order = self.bus.ordered();
        let issue = PerformanceIssue {
            kind,
            message: message.into(),
            timestamp: self.clock.epoch_ms(),
        };
        self.issues.lock().push(issue.clone());
        self.bus.notify(&issue);
        issue
    }

    /// Newest first.
    pub fn recent(&self) -> Vec<PerformanceIssue> {
        self.issues.lock().iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.issues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.lock().is_empty()
    }

    pub fn clear(&self) {
        self.issues.lock().clear();
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PerformanceIssue) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }
}
