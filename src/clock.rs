use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// Time source shared by every collector.
///
/// `epoch_ms` stamps records; `monotonic_ms` measures elapsed time and is
/// the only value `TimingTracker` subtracts.
pub trait Clock: Send + Sync {
    fn epoch_ms(&self) -> i64;
    fn monotonic_ms(&self) -> f64;
}

pub type SharedClock = Arc<dyn Clock>;

// ─── SystemClock ─────────────────────────────────────────────────

/// Wall clock for timestamps, `Instant` anchor for elapsed time.
pub struct SystemClock {
    anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn epoch_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn monotonic_ms(&self) -> f64 {
        self.anchor.elapsed().as_secs_f64() * 1000.0
    }
}

// ─── ManualClock ─────────────────────────────────────────────────

/// Clock that only moves when told to. Both readings advance together.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    epoch_ms: i64,
    monotonic_ms: f64,
    /// Sub-millisecond remainder not yet applied to `epoch_ms`
    carry_ms: f64,
}

impl ManualClock {
    pub fn new(epoch_ms: i64) -> Self {
        Self {
            state: Mutex::new(ManualState {
                epoch_ms,
                monotonic_ms: 0.0,
                carry_ms: 0.0,
            }),
        }
    }

    pub fn shared(epoch_ms: i64) -> Arc<Self> {
        Arc::new(Self::new(epoch_ms))
    }

    /// Move both readings forward by `ms`. The epoch reading moves in whole
    /// milliseconds; fractions accumulate until they add up to one.
    pub fn advance(&self, ms: f64) {
        let mut state = self.state.lock();
        state.monotonic_ms += ms;
        state.carry_ms += ms;
        let whole = state.carry_ms.trunc();
        state.carry_ms -= whole;
        state.epoch_ms = state.epoch_ms.saturating_add(whole as i64);
    }

    pub fn set_epoch_ms(&self, epoch_ms: i64) {
        let mut state = self.state.lock();
        state.epoch_ms = epoch_ms;
        state.carry_ms = 0.0;
    }
}

impl Clock for ManualClock {
    fn epoch_ms(&self) -> i64 {
        self.state.lock().epoch_ms
    }

    fn monotonic_ms(&self) -> f64 {
        self.state.lock().monotonic_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_both_readings() {
        let clock = ManualClock::new(1_000);
        clock.advance(2.5);

        assert_eq!(clock.monotonic_ms(), 2.5);
        assert_eq!(clock.epoch_ms(), 1_002);

        clock.set_epoch_ms(50);
        assert_eq!(clock.epoch_ms(), 50);
        assert_eq!(clock.monotonic_ms(), 2.5);
    }

    #[test]
    fn test_small_steps_accumulate_on_epoch() {
        let clock = ManualClock::new(0);
        for _ in 0..10 {
            clock.advance(0.25);
        }

        assert_eq!(clock.monotonic_ms(), 2.5);
        assert_eq!(clock.epoch_ms(), 2);

        clock.advance(0.5);
        assert_eq!(clock.epoch_ms(), 3);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.monotonic_ms();
        let b = clock.monotonic_ms();
        assert!(b >= a);
        assert!(clock.epoch_ms() > 0);
    }
}
