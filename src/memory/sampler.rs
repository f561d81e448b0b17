use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::leak::LEAK_GROWTH_MB_PER_S;
use super::{
    classify_pressure, growth_rate, usage_percent, MemoryReading, MemorySample, MemorySignal,
    MemorySignalSource, RawMemoryReading, MEMORY_HISTORY_SIZE,
};
use crate::bus::{ObservationBus, Subscription};
use crate::clock::SharedClock;
use crate::error::{Result, TelemetryError};
use crate::history::BoundedHistory;

// ─── Configuration ───────────────────────────────────────────────

pub type MemoryHook = Arc<dyn Fn(&MemoryReading) + Send + Sync>;

#[derive(Clone)]
pub struct MemorySamplerOptions {
    /// Usage % at or above which pressure is "high"
    pub warning_threshold: f64,
    /// Usage % at or above which pressure is "critical"
    pub critical_threshold: f64,
    /// Growth (MB/s) above which `on_memory_leak` fires
    pub leak_growth_threshold: f64,
    pub on_memory_warning: Option<MemoryHook>,
    pub on_memory_leak: Option<MemoryHook>,
}

impl Default for MemorySamplerOptions {
    fn default() -> Self {
        Self {
            warning_threshold: 70.0,
            critical_threshold: 90.0,
            leak_growth_threshold: LEAK_GROWTH_MB_PER_S,
            on_memory_warning: None,
            on_memory_leak: None,
        }
    }
}

impl MemorySamplerOptions {
    pub fn on_memory_warning(mut self, hook: impl Fn(&MemoryReading) + Send + Sync + 'static) -> Self {
        self.on_memory_warning = Some(Arc::new(hook));
        self
    }

    pub fn on_memory_leak(mut self, hook: impl Fn(&MemoryReading) + Send + Sync + 'static) -> Self {
        self.on_memory_leak = Some(Arc::new(hook));
        self
    }
}

// ─── Public types ────────────────────────────────────────────────

/// Pull-model sampler: idle until `start()`, then reads the memory signal
/// on every interval tick. `tick()` runs one step directly.
pub struct MemorySampler {
    options: MemorySamplerOptions,
    clock: SharedClock,
    source: Arc<dyn MemorySignalSource>,
    state: Mutex<SamplerState>,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    bus: ObservationBus<MemoryReading>,
}

struct SamplerState {
    history: BoundedHistory<MemorySample>,
    latest: Option<MemoryReading>,
    supported: bool,
}

// ─── MemorySampler impl ──────────────────────────────────────────

impl MemorySampler {
    pub fn new(
        options: MemorySamplerOptions,
        source: Arc<dyn MemorySignalSource>,
        clock: SharedClock,
    ) -> Self {
        Self {
            options,
            clock,
            source,
            state: Mutex::new(SamplerState {
                history: BoundedHistory::new(MEMORY_HISTORY_SIZE),
                latest: None,
                supported: true,
            }),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
            bus: ObservationBus::new(),
        }
    }

    /// Begin periodic sampling. The first reading, which checks support, is kept
    /// as the first sample; later samples follow every `interval`.
    ///
    /// Idempotent. Stays idle when the source reports unsupported. Must be
    /// called from within a tokio runtime.
    pub fn start(self: &Arc<Self>, interval: Duration) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TelemetryError::NoRuntime)?;

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        {
            let _order = self.bus.ordered();
            match self.source.read() {
                MemorySignal::Supported(raw) => {
                    self.ingest(raw);
                }
                MemorySignal::Unsupported => {
                    self.state.lock().supported = false;
                    self.running.store(false, Ordering::SeqCst);
                    tracing::debug!("memory signal unsupported; sampler stays idle");
                    return Ok(());
                }
            }
        }

        let weak = Arc::downgrade(self);
        let period = interval.max(Duration::from_millis(1));
        let handle = runtime.spawn(async move {
            let first = tokio::time::Instant::now() + period;
            let mut ticks = IntervalStream::new(tokio::time::interval_at(first, period));
            while ticks.next().await.is_some() {
                let Some(sampler) = weak.upgrade() else {
                    break;
                };
                if !sampler.running.load(Ordering::SeqCst) {
                    break;
                }
                if sampler.tick().is_none() {
                    sampler.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Idempotent. An in-flight tick may finish; no further ticks run.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    /// One sampling step. `None` when the source is unsupported.
    pub fn tick(&self) -> Option<MemoryReading> {
        let _order = self.bus.ordered();
        let raw = match self.source.read() {
            MemorySignal::Supported(raw) => raw,
            MemorySignal::Unsupported => {
                self.state.lock().supported = false;
                return None;
            }
        };
        Some(self.ingest(raw))
    }

    fn ingest(&self, raw: RawMemoryReading) -> MemoryReading {
        let _order = self.bus.ordered();
        let reading = {
            let mut state = self.state.lock();
            state.supported = true;

            let timestamp_ms = self.clock.epoch_ms();
            state.history.push(MemorySample {
                timestamp_ms,
                used_mb: raw.used_mb,
            });

            let usage = usage_percent(raw.used_mb, raw.limit_mb);
            let reading = MemoryReading {
                used_mb: raw.used_mb,
                total_mb: raw.total_mb,
                limit_mb: raw.limit_mb,
                usage_percent: usage,
                pressure: classify_pressure(
                    usage,
                    self.options.warning_threshold,
                    self.options.critical_threshold,
                ),
                growth_rate: growth_rate(&state.history),
                timestamp_ms,
            };
            state.latest = Some(reading.clone());
            reading
        };

        if reading.pressure.is_elevated() {
            tracing::warn!(
                used_mb = reading.used_mb,
                usage_percent = reading.usage_percent,
                "memory pressure {}",
                reading.pressure.as_str()
            );
            if let Some(hook) = &self.options.on_memory_warning {
                hook(&reading);
            }
        }

        if reading.growth_rate > self.options.leak_growth_threshold {
            if let Some(hook) = &self.options.on_memory_leak {
                hook(&reading);
            }
        }

        self.bus.notify(&reading);
        reading
    }

    pub fn latest(&self) -> Option<MemoryReading> {
        self.state.lock().latest.clone()
    }

    pub fn history(&self) -> Vec<MemorySample> {
        self.state.lock().history.items()
    }

    pub fn is_sampling(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_supported(&self) -> bool {
        self.state.lock().supported
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.latest = None;
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&MemoryReading) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    pub fn bus(&self) -> &ObservationBus<MemoryReading> {
        &self.bus
    }
}

impl Drop for MemorySampler {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::{LeakDetector, PressureLevel};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    fn supported(used_mb: f64) -> MemorySignal {
        MemorySignal::Supported(RawMemoryReading {
            used_mb,
            total_mb: used_mb + 10.0,
            limit_mb: 100.0,
        })
    }

    /// Source replaying a fixed script, repeating the last entry.
    fn scripted(script: Vec<MemorySignal>) -> Arc<dyn MemorySignalSource> {
        let queue = Mutex::new(VecDeque::from(script));
        Arc::new(move || {
            let mut q = queue.lock();
            if q.len() > 1 {
                q.pop_front().unwrap_or(MemorySignal::Unsupported)
            } else {
                q.front().copied().unwrap_or(MemorySignal::Unsupported)
            }
        })
    }

    #[test]
    fn test_tick_classifies_pressure_and_growth() {
        let clock = ManualClock::shared(0);
        let sampler = MemorySampler::new(
            MemorySamplerOptions::default(),
            scripted(vec![supported(50.0), supported(71.0)]),
            clock.clone(),
        );

        let first = sampler.tick().unwrap();
        assert_eq!(first.pressure, PressureLevel::Medium);
        assert_eq!(first.growth_rate, 0.0);

        clock.advance(1_000.0);
        let second = sampler.tick().unwrap();
        assert_eq!(second.pressure, PressureLevel::High);
        assert!((second.growth_rate - 21.0).abs() < 1e-9);
        assert_eq!(sampler.history().len(), 2);
        assert_eq!(sampler.latest(), Some(second));
    }

    #[test]
    fn test_history_is_bounded() {
        let clock = ManualClock::shared(0);
        let sampler = MemorySampler::new(
            MemorySamplerOptions::default(),
            scripted(vec![supported(10.0)]),
            clock.clone(),
        );
        for _ in 0..30 {
            sampler.tick();
            clock.advance(100.0);
        }
        assert_eq!(sampler.history().len(), MEMORY_HISTORY_SIZE);
    }

    #[test]
    fn test_warning_and_leak_hooks() {
        let warnings = Arc::new(AtomicUsize::new(0));
        let leaks = Arc::new(AtomicUsize::new(0));
        let (w, l) = (warnings.clone(), leaks.clone());
        let options = MemorySamplerOptions::default()
            .on_memory_warning(move |_| {
                w.fetch_add(1, Ordering::SeqCst);
            })
            .on_memory_leak(move |_| {
                l.fetch_add(1, Ordering::SeqCst);
            });

        let clock = ManualClock::shared(0);
        let sampler = MemorySampler::new(
            options,
            scripted(vec![supported(50.0), supported(50.05), supported(95.0)]),
            clock.clone(),
        );

        sampler.tick();
        clock.advance(1_000.0);
        sampler.tick();
        assert_eq!(warnings.load(Ordering::SeqCst), 0);
        assert_eq!(leaks.load(Ordering::SeqCst), 0);

        clock.advance(1_000.0);
        sampler.tick();
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
        assert_eq!(leaks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_leak_flag_follows_sampler_readings() {
        let clock = ManualClock::shared(0);
        let sampler = MemorySampler::new(
            MemorySamplerOptions::default(),
            scripted(vec![supported(71.0), supported(71.2), supported(71.1)]),
            clock.clone(),
        );
        let detector = Arc::new(LeakDetector::new());
        let d = detector.clone();
        sampler.subscribe(move |reading| {
            d.observe(reading);
        });

        sampler.tick();
        assert!(!detector.is_leaking());

        clock.advance(1_000.0);
        sampler.tick();
        assert!(detector.is_leaking());

        clock.advance(1_000.0);
        sampler.tick();
        assert!(!detector.is_leaking());
    }

    #[test]
    fn test_unsupported_source_degrades() {
        let sampler = MemorySampler::new(
            MemorySamplerOptions::default(),
            Arc::new(|| MemorySignal::Unsupported),
            ManualClock::shared(0),
        );
        assert!(sampler.tick().is_none());
        assert!(!sampler.is_supported());
        assert!(sampler.latest().is_none());
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let sampler = Arc::new(MemorySampler::new(
            MemorySamplerOptions::default(),
            scripted(vec![supported(1.0)]),
            ManualClock::shared(0),
        ));
        assert!(matches!(
            sampler.start(Duration::from_secs(1)),
            Err(TelemetryError::NoRuntime)
        ));
        assert!(!sampler.is_sampling());
    }

    #[tokio::test]
    async fn test_start_with_unsupported_source_stays_idle() {
        let sampler = Arc::new(MemorySampler::new(
            MemorySamplerOptions::default(),
            Arc::new(|| MemorySignal::Unsupported),
            ManualClock::shared(0),
        ));
        sampler.start(Duration::from_millis(10)).unwrap();
        assert!(!sampler.is_sampling());
        assert!(!sampler.is_supported());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sampling_and_stop() {
        let sampler = Arc::new(MemorySampler::new(
            MemorySamplerOptions::default(),
            scripted(vec![supported(20.0)]),
            ManualClock::shared(0),
        ));

        sampler.start(Duration::from_millis(1_000)).unwrap();
        sampler.start(Duration::from_millis(1_000)).unwrap();
        assert!(sampler.is_sampling());

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let taken = sampler.history().len();
        assert!(taken >= 2, "expected periodic samples, got {taken}");

        sampler.stop();
        sampler.stop();
        assert!(!sampler.is_sampling());

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(sampler.history().len(), taken);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_keeps_first_reading() {
        let sampler = Arc::new(MemorySampler::new(
            MemorySamplerOptions::default(),
            scripted(vec![supported(20.0), supported(30.0), supported(40.0)]),
            ManualClock::shared(0),
        ));

        sampler.start(Duration::from_millis(1_000)).unwrap();
        let history = sampler.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].used_mb, 20.0);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let used: Vec<f64> = sampler.history().iter().map(|s| s.used_mb).collect();
        assert_eq!(used, vec![20.0, 30.0]);
        sampler.stop();
    }

    #[test]
    fn test_concurrent_ticks_keep_latest_in_step() {
        let next = Arc::new(AtomicUsize::new(0));
        let n = next.clone();
        let source: Arc<dyn MemorySignalSource> =
            Arc::new(move || supported(n.fetch_add(1, Ordering::SeqCst) as f64 * 0.01));
        let sampler = MemorySampler::new(
            MemorySamplerOptions::default(),
            source,
            ManualClock::shared(0),
        );

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let d = delivered.clone();
        sampler.subscribe(move |reading| d.lock().push(reading.used_mb));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        sampler.tick();
                    }
                });
            }
        });

        let delivered = delivered.lock();
        assert_eq!(delivered.len(), 1_600);
        assert!(delivered.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sampler.history().len(), MEMORY_HISTORY_SIZE);
        assert_eq!(sampler.latest().map(|r| r.used_mb), delivered.last().copied());
    }
}
