use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::{ExportDestination, ReportAggregator};
use crate::error::{Result, TelemetryError};

// ─── Periodic export ─────────────────────────────────────────────

/// Handle to a running periodic export. Dropping it stops the task.
#[derive(Debug)]
pub struct ReportTask {
    handle: JoinHandle<()>,
}

impl ReportTask {
    /// Idempotent.
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ReportTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl ReportAggregator {
    /// Export to `destination` on every tick, the first one immediately.
    ///
    /// The task holds a weak handle and ends on its own once the aggregator
    /// is dropped. Must be called from within a tokio runtime.
    pub fn spawn_periodic(
        self: &Arc<Self>,
        interval: Duration,
        destination: ExportDestination,
    ) -> Result<ReportTask> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TelemetryError::NoRuntime)?;

        let weak = Arc::downgrade(self);
        let period = interval.max(Duration::from_millis(1));
        let handle = runtime.spawn(async move {
            let mut ticks = IntervalStream::new(tokio::time::interval(period));
            while ticks.next().await.is_some() {
                let Some(aggregator) = weak.upgrade() else {
                    break;
                };
                aggregator.export(destination);
            }
            tracing::debug!("periodic report task finished");
        });

        Ok(ReportTask { handle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use parking_lot::Mutex;

    fn counting(aggregator: &ReportAggregator) -> Arc<Mutex<usize>> {
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        aggregator.subscribe(move |_| *c.lock() += 1);
        count
    }

    #[tokio::test(start_paused = true)]
    async fn test_exports_on_every_tick_until_stopped() {
        let aggregator = Arc::new(ReportAggregator::new(ManualClock::shared(0)));
        let count = counting(&aggregator);

        let task = aggregator
            .spawn_periodic(Duration::from_millis(100), ExportDestination::Memory)
            .unwrap();

        // immediate first tick, then t=100 and t=200
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(*count.lock(), 3);

        task.stop();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*count.lock(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_ends_when_aggregator_dropped() {
        let aggregator = Arc::new(ReportAggregator::new(ManualClock::shared(0)));
        let task = aggregator
            .spawn_periodic(Duration::from_millis(50), ExportDestination::Memory)
            .unwrap();

        drop(aggregator);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(task.is_finished());
    }

    #[test]
    fn test_requires_runtime() {
        let aggregator = Arc::new(ReportAggregator::new(ManualClock::shared(0)));
        let err = aggregator
            .spawn_periodic(Duration::from_millis(50), ExportDestination::Memory)
            .unwrap_err();
        assert!(matches!(err, TelemetryError::NoRuntime));
    }
}
