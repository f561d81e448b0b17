pub mod monitor;
pub mod stats;

use serde::Serialize;

pub use monitor::{ApiCallMonitor, ApiMonitorOptions, CallHook};
pub use stats::ApiPerformanceStats;

/// Outcome of one completed (or failed) network call, as reported by the
/// executor. The monitor never performs the call itself.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub url: String,
    pub method: String,
    /// Monotonic milliseconds when the call was issued
    pub start_time: f64,
    /// Monotonic milliseconds when the call settled
    pub end_time: f64,
    /// HTTP status; 0 when the call never produced a response
    pub status: u16,
    pub success: bool,
    /// Response size in bytes, when the transport reported one
    pub size: Option<u64>,
    pub error: Option<String>,
}

impl CallOutcome {
    pub fn success(
        url: impl Into<String>,
        method: impl Into<String>,
        start_time: f64,
        end_time: f64,
        status: u16,
    ) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            start_time,
            end_time,
            status,
            success: true,
            size: None,
            error: None,
        }
    }

    pub fn failure(
        url: impl Into<String>,
        method: impl Into<String>,
        start_time: f64,
        end_time: f64,
        status: u16,
        error: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            start_time,
            end_time,
            status,
            success: false,
            size: None,
            error: Some(error.into()),
        }
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.size = Some(bytes);
        self
    }
}

/// Immutable record of a call, created when the call completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiCallRecord {
    pub id: String,
    pub url: String,
    pub method: String,
    pub start_time: f64,
    pub end_time: f64,
    /// `end_time - start_time`, clamped to zero when negative
    pub duration: f64,
    pub status: u16,
    pub success: bool,
    pub size: Option<u64>,
    pub error: Option<String>,
    /// Epoch milliseconds at record time; drives the stats window
    pub timestamp: i64,
}
