pub mod collector;
pub mod percentiles;
pub mod rating;

use serde::Serialize;

pub use collector::{AlertCallback, MetricAlert, MetricCollector, MetricSink, MetricUpdated, VitalsSummary};
pub use rating::{classify, MetricUnit, Rating, RatingThreshold, RatingThresholds};

/// Current reading for one navigation/paint style metric.
/// Only the latest sample per name is retained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    /// e.g. "LCP"
    pub name: String,
    pub value: f64,
    /// Change since the previous report of the same metric
    pub delta: f64,
    /// Epoch milliseconds at record time
    pub timestamp: i64,
    pub rating: Rating,
}
