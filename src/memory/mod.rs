pub mod leak;
pub mod sampler;

use serde::Serialize;

use crate::history::BoundedHistory;

pub use leak::LeakDetector;
pub use sampler::{MemoryHook, MemorySampler, MemorySamplerOptions};

/// Rolling sample buffer size
pub const MEMORY_HISTORY_SIZE: usize = 20;

// ─── Signal source ───────────────────────────────────────────────

/// Raw figures from the platform, all in megabytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMemoryReading {
    pub used_mb: f64,
    pub total_mb: f64,
    pub limit_mb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemorySignal {
    Supported(RawMemoryReading),
    Unsupported,
}

/// Polled memory signal. Never pushes.
pub trait MemorySignalSource: Send + Sync {
    fn read(&self) -> MemorySignal;
}

impl<F> MemorySignalSource for F
where
    F: Fn() -> MemorySignal + Send + Sync,
{
    fn read(&self) -> MemorySignal {
        self()
    }
}

/// Source for hosts without a memory signal; the sampler stays idle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMemorySignal;

impl MemorySignalSource for NoMemorySignal {
    fn read(&self) -> MemorySignal {
        MemorySignal::Unsupported
    }
}

// ─── Derived state ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemorySample {
    pub timestamp_ms: i64,
    pub used_mb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PressureLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            PressureLevel::Low => "low",
            PressureLevel::Medium => "medium",
            PressureLevel::High => "high",
            PressureLevel::Critical => "critical",
        }
    }

    pub fn is_elevated(self) -> bool {
        self >= PressureLevel::High
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryReading {
    pub used_mb: f64,
    pub total_mb: f64,
    pub limit_mb: f64,
    pub usage_percent: f64,
    pub pressure: PressureLevel,
    /// MB/s between the oldest and newest buffered samples
    pub growth_rate: f64,
    pub timestamp_ms: i64,
}

/// `used / limit` as a percentage; 0 when the limit is unknown.
pub fn usage_percent(used_mb: f64, limit_mb: f64) -> f64 {
    if limit_mb > 0.0 {
        used_mb / limit_mb * 100.0
    } else {
        0.0
    }
}

pub fn classify_pressure(usage_percent: f64, warning: f64, critical: f64) -> PressureLevel {
    if usage_percent >= critical {
        PressureLevel::Critical
    } else if usage_percent >= warning {
        PressureLevel::High
    } else if usage_percent >= warning * 0.7 {
        PressureLevel::Medium
    } else {
        PressureLevel::Low
    }
}

/// Linear delta between the first and last samples. 0 with fewer than two
/// samples or no elapsed time between them.
pub fn growth_rate(history: &BoundedHistory<MemorySample>) -> f64 {
    let (Some(oldest), Some(newest)) = (history.first(), history.last()) else {
        return 0.0;
    };
    if history.len() < 2 {
        return 0.0;
    }
    let secs = (newest.timestamp_ms - oldest.timestamp_ms) as f64 / 1000.0;
    if secs <= 0.0 {
        return 0.0;
    }
    (newest.used_mb - oldest.used_mb) / secs
}
