use std::sync::atomic::{AtomicBool, Ordering};

use super::MemoryReading;

/// Growth above this (MB/s) counts as sustained growth.
pub const LEAK_GROWTH_MB_PER_S: f64 = 0.1;

/// Raises `is_leaking` only while growth and elevated pressure coincide.
/// Resets on the first reading where either condition is false.
#[derive(Debug)]
pub struct LeakDetector {
    growth_threshold: f64,
    leaking: AtomicBool,
}

impl LeakDetector {
    pub fn new() -> Self {
        Self::with_threshold(LEAK_GROWTH_MB_PER_S)
    }

    pub fn with_threshold(growth_threshold: f64) -> Self {
        Self {
            growth_threshold,
            leaking: AtomicBool::new(false),
        }
    }

    pub fn observe(&self, reading: &MemoryReading) -> bool {
        let leaking = reading.growth_rate > self.growth_threshold && reading.pressure.is_elevated();
        let was = self.leaking.swap(leaking, Ordering::SeqCst);
        if leaking && !was {
            tracing::warn!(
                growth_rate = reading.growth_rate,
                pressure = reading.pressure.as_str(),
                "possible memory leak"
            );
        }
        leaking
    }

    pub fn is_leaking(&self) -> bool {
        self.leaking.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.leaking.store(false, Ordering::SeqCst);
    }
}

impl Default for LeakDetector {
    fn default() -> Self {
        Self::new()
    }
}
