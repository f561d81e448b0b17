use serde::Serialize;

use super::ApiCallRecord;
use crate::metrics::percentiles::{distribution, percentile, DistBucket};

/// Statistics over the records inside one time window. Derived on demand,
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiPerformanceStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Mean duration (ms)
    pub average_response_time: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    /// Failed / total, as a percentage
    pub error_rate: f64,
    /// Calls per minute, extrapolated linearly from the window length
    pub throughput: f64,
    /// Sum of sizes over records that reported one (bytes)
    pub total_data_transferred: u64,
    pub slowest_call: Option<ApiCallRecord>,
    pub fastest_call: Option<ApiCallRecord>,
    pub distribution: Vec<DistBucket>,
    pub window_ms: u64,
}

impl ApiPerformanceStats {
    /// All-zero stats for an empty window.
    pub fn empty(window_ms: u64) -> Self {
        Self {
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            average_response_time: 0.0,
            p50: 0.0,
            p90: 0.0,
            p99: 0.0,
            error_rate: 0.0,
            throughput: 0.0,
            total_data_transferred: 0,
            slowest_call: None,
            fastest_call: None,
            distribution: Vec::new(),
            window_ms,
        }
    }

    pub fn has_data(&self) -> bool {
        self.total_calls > 0
    }

    /// Compute stats over `records` whose timestamp lies within `window_ms`
    /// of `now_ms`. Records are expected oldest first.
    pub fn compute<'a, I>(records: I, now_ms: i64, window_ms: u64) -> Self
    where
        I: IntoIterator<Item = &'a ApiCallRecord>,
    {
        let window = i64::try_from(window_ms).unwrap_or(i64::MAX);
        let recent: Vec<&ApiCallRecord> = records
            .into_iter()
            .filter(|r| now_ms.saturating_sub(r.timestamp) <= window)
            .collect();

        if recent.is_empty() {
            return Self::empty(window_ms);
        }

        let total = recent.len() as u64;
        let successful = recent.iter().filter(|r| r.success).count() as u64;
        let failed = total - successful;

        let mut durations: Vec<f64> = recent.iter().map(|r| r.duration).collect();
        durations.sort_by(f64::total_cmp);
        let average = durations.iter().sum::<f64>() / durations.len() as f64;

        let throughput = if window_ms == 0 {
            0.0
        } else {
            total as f64 / (window_ms as f64 / 1000.0) * 60.0
        };

        let total_bytes: u64 = recent.iter().filter_map(|r| r.size).sum();

        // First-seen wins ties on both ends.
        let mut slowest = recent[0];
        let mut fastest = recent[0];
        for &r in &recent[1..] {
            if r.duration > slowest.duration {
                slowest = r;
            }
            if r.duration < fastest.duration {
                fastest = r;
            }
        }

        Self {
            total_calls: total,
            successful_calls: successful,
            failed_calls: failed,
            average_response_time: average,
            p50: percentile(&durations, 0.5),
            p90: percentile(&durations, 0.9),
            p99: percentile(&durations, 0.99),
            error_rate: failed as f64 / total as f64 * 100.0,
            throughput,
            total_data_transferred: total_bytes,
            slowest_call: Some(slowest.clone()),
            fastest_call: Some(fastest.clone()),
            distribution: distribution(&durations),
            window_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, duration: f64, success: bool, size: Option<u64>, timestamp: i64) -> ApiCallRecord {
        ApiCallRecord {
            id: id.into(),
            url: "/api/contracts".into(),
            method: "GET".into(),
            start_time: 0.0,
            end_time: duration,
            duration,
            status: if success { 200 } else { 500 },
            success,
            size,
            error: None,
            timestamp,
        }
    }

    #[test]
    fn test_empty_window_is_all_zero() {
        let stats = ApiPerformanceStats::compute(&Vec::new(), 1_000, 300_000);
        assert_eq!(stats, ApiPerformanceStats::empty(300_000));
        assert!(stats.slowest_call.is_none());
        assert!(!stats.has_data());
    }

    #[test]
    fn test_full_computation() {
        let records = vec![
            record("a", 10.0, true, Some(100), 1_000),
            record("b", 40.0, false, None, 1_000),
            record("c", 20.0, true, Some(50), 1_000),
            record("d", 30.0, true, None, 1_000),
        ];
        let stats = ApiPerformanceStats::compute(&records, 2_000, 60_000);

        assert_eq!(stats.total_calls, 4);
        assert_eq!(stats.successful_calls, 3);
        assert_eq!(stats.failed_calls, 1);
        assert_eq!(stats.average_response_time, 25.0);
        assert_eq!(stats.p50, 20.0);
        assert_eq!(stats.p90, 40.0);
        assert_eq!(stats.p99, 40.0);
        assert_eq!(stats.error_rate, 25.0);
        assert_eq!(stats.throughput, 4.0);
        assert_eq!(stats.total_data_transferred, 150);
        assert_eq!(stats.slowest_call.unwrap().id, "b");
        assert_eq!(stats.fastest_call.unwrap().id, "a");
    }

    #[test]
    fn test_window_filters_old_records() {
        let records = vec![
            record("old", 500.0, true, None, 0),
            record("new", 5.0, true, None, 9_000),
        ];
        let stats = ApiPerformanceStats::compute(&records, 10_000, 5_000);

        assert_eq!(stats.total_calls, 1);
        assert_eq!(stats.slowest_call.unwrap().id, "new");
    }

    #[test]
    fn test_window_edge_is_inclusive() {
        let records = vec![record("edge", 5.0, true, None, 5_000)];
        let stats = ApiPerformanceStats::compute(&records, 10_000, 5_000);
        assert_eq!(stats.total_calls, 1);
    }

    #[test]
    fn test_ties_prefer_first_seen() {
        let records = vec![
            record("first", 7.0, true, None, 0),
            record("second", 7.0, true, None, 0),
        ];
        let stats = ApiPerformanceStats::compute(&records, 0, 1_000);

        assert_eq!(stats.slowest_call.unwrap().id, "first");
        assert_eq!(stats.fastest_call.unwrap().id, "first");
    }
}
