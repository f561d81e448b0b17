use hdrhistogram::Histogram;
use serde::Serialize;

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW_US: u64 = 1;
const HIST_HIGH_US: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

/// Bucket boundaries (ms) for the latency distribution. Covers typical
/// API latencies from a fast cache hit to a timed-out request.
const DIST_BOUNDARIES_MS: &[f64] = &[
    50.0, 100.0, 200.0, 300.0, 500.0, 750.0, 1_000.0, 1_500.0, 2_000.0, 3_000.0,
    5_000.0, 10_000.0,
];

/// Nearest-rank percentile over an ascending slice.
/// `p` is a fraction (0.5 for p50). Empty input yields 0.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (sorted.len() as f64 * p).ceil() as i64 - 1;
    let idx = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[idx]
}

/// A bucket in the latency distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistBucket {
    pub range_start_ms: f64,
    pub range_end_ms: f64,
    pub count: u64,
}

/// Bucket `durations_ms` over the fixed boundaries, skipping empty buckets.
/// Values are recorded in microseconds, clamped to the histogram range.
pub fn distribution(durations_ms: &[f64]) -> Vec<DistBucket> {
    if durations_ms.is_empty() {
        return Vec::new();
    }

    let mut hist = match Histogram::<u64>::new_with_bounds(HIST_LOW_US, HIST_HIGH_US, HIST_SIGFIG) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!("latency histogram creation failed: {e}");
            return Vec::new();
        }
    };
    for &ms in durations_ms {
        let us = (ms * 1000.0).round().max(HIST_LOW_US as f64) as u64;
        hist.saturating_record(us);
    }

    let bounds = DIST_BOUNDARIES_MS;
    let mut counts = vec![0u64; bounds.len() + 1]; // +1 for overflow

    // Buckets are (start, end]. Place each HDR bucket by its lowest
    // equivalent value so an exact boundary hit stays in the lower bucket.
    for iv in hist.iter_recorded() {
        let val_ms = hist.lowest_equivalent(iv.value_iterated_to()) as f64 / 1000.0;
        let idx = bounds.partition_point(|&b| b < val_ms);
        counts[idx] += iv.count_at_value();
    }

    let mut result = Vec::with_capacity(counts.len());
    let mut prev = 0.0;
    for (i, &boundary) in bounds.iter().enumerate() {
        if counts[i] > 0 {
            result.push(DistBucket {
                range_start_ms: prev,
                range_end_ms: boundary,
                count: counts[i],
            });
        }
        prev = boundary;
    }
    if counts[bounds.len()] > 0 {
        result.push(DistBucket {
            range_start_ms: prev,
            range_end_ms: hist.max() as f64 / 1000.0,
            count: counts[bounds.len()],
        });
    }

    result
}
