use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::rating::{classify, Rating, RatingThresholds};
use super::MetricSample;
use crate::bus::{ObservationBus, Subscription};
use crate::clock::SharedClock;
use crate::error::{Result, TelemetryError};

// ─── Public types ────────────────────────────────────────────────

/// Optional per-sample forwarding target (analytics, external reporters).
pub trait MetricSink: Send + Sync {
    fn accept(&self, sample: &MetricSample);
}

/// Message dispatched to subscribers after every accepted sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricUpdated {
    pub name: String,
    pub value: f64,
    pub rating: Rating,
}

pub type AlertCallback = Arc<dyn Fn(&MetricSample) + Send + Sync>;

/// Per-metric threshold alert. Fires when an accepted sample's value is
/// at or above `threshold` while enabled.
#[derive(Clone)]
pub struct MetricAlert {
    pub threshold: f64,
    pub enabled: bool,
    callback: AlertCallback,
}

impl std::fmt::Debug for MetricAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricAlert")
            .field("threshold", &self.threshold)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Worst-of rollup across every metric seen so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VitalsSummary {
    pub overall: Rating,
    pub per_metric: BTreeMap<String, Rating>,
    /// One line per metric currently rated poor.
    pub issues: Vec<String>,
    /// Mean of per-metric rating scores, 0–100.
    pub score: f64,
}

/// Latest-value store for navigation/paint style metrics.
/// Sources call `record()`, the report aggregator calls `summary()`.
pub struct MetricCollector {
    thresholds: RatingThresholds,
    clock: SharedClock,
    sink: Option<Arc<dyn MetricSink>>,
    current: Mutex<BTreeMap<String, MetricSample>>,
    alerts: Mutex<HashMap<String, MetricAlert>>,
    bus: ObservationBus<MetricUpdated>,
}

// ─── MetricCollector impl ────────────────────────────────────────

impl MetricCollector {
    pub fn new(thresholds: RatingThresholds, clock: SharedClock) -> Self {
        Self {
            thresholds,
            clock,
            sink: None,
            current: Mutex::new(BTreeMap::new()),
            alerts: Mutex::new(HashMap::new()),
            bus: ObservationBus::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn thresholds(&self) -> &RatingThresholds {
        &self.thresholds
    }

    /// Store `value` as the current reading for `name`.
    ///
    /// Unknown names are rejected before any state changes.
    pub fn record(&self, name: &str, value: f64, delta: f64) -> Result<MetricSample> {
        let rating = classify(name, value, &self.thresholds)?;
        let _order = self.bus.ordered();

        let sample = MetricSample {
            name: name.to_owned(),
            value,
            delta,
            timestamp: self.clock.epoch_ms(),
            rating,
        };
        self.current.lock().insert(name.to_owned(), sample.clone());

        if rating == Rating::Poor {
            if let Some(t) = self.thresholds.get(name) {
                tracing::warn!(
                    metric = name,
                    value,
                    "performance alert: {name} is poor ({value}{})",
                    t.unit.suffix()
                );
            }
        }

        if let Some(sink) = &self.sink {
            sink.accept(&sample);
        }

        self.bus.notify(&MetricUpdated {
            name: sample.name.clone(),
            value,
            rating,
        });
        self.check_alert(&sample);

        Ok(sample)
    }

    /// Register (or replace) the alert for `name`, enabled.
    pub fn add_alert<F>(&self, name: &str, threshold: f64, callback: F) -> Result<()>
    where
        F: Fn(&MetricSample) + Send + Sync + 'static,
    {
        if !threshold.is_finite() {
            return Err(TelemetryError::InvalidConfig(format!(
                "alert threshold for {name} must be finite"
            )));
        }
        self.alerts.lock().insert(
            name.to_owned(),
            MetricAlert {
                threshold,
                enabled: true,
                callback: Arc::new(callback),
            },
        );
        Ok(())
    }

    /// Returns false when no alert is registered for `name`.
    pub fn set_alert_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.alerts.lock().get_mut(name) {
            Some(alert) => {
                alert.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn remove_alert(&self, name: &str) -> bool {
        self.alerts.lock().remove(name).is_some()
    }

    pub fn alert(&self, name: &str) -> Option<MetricAlert> {
        self.alerts.lock().get(name).cloned()
    }

    pub fn clear_alerts(&self) {
        self.alerts.lock().clear();
    }

    fn check_alert(&self, sample: &MetricSample) {
        let callback = match self.alerts.lock().get(&sample.name) {
            Some(alert) if alert.enabled && sample.value >= alert.threshold => {
                alert.callback.clone()
            }
            _ => return,
        };
        tracing::debug!(metric = %sample.name, value = sample.value, "metric alert fired");
        callback(sample);
    }

    pub fn get(&self, name: &str) -> Option<MetricSample> {
        self.current.lock().get(name).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, MetricSample> {
        self.current.lock().clone()
    }

    pub fn summary(&self) -> VitalsSummary {
        let current = self.current.lock();

        let mut overall = Rating::Good;
        let mut per_metric = BTreeMap::new();
        let mut issues = Vec::new();
        let mut score_sum = 0.0;

        for (name, sample) in current.iter() {
            overall = overall.max(sample.rating);
            score_sum += sample.rating.score();
            per_metric.insert(name.clone(), sample.rating);

            if sample.rating == Rating::Poor {
                let unit = self
                    .thresholds
                    .get(name)
                    .map(|t| t.unit.suffix())
                    .unwrap_or_default();
                issues.push(format!("{name} is poor ({}{unit})", sample.value));
            }
        }

        let score = if current.is_empty() {
            100.0
        } else {
            score_sum / current.len() as f64
        };

        VitalsSummary {
            overall,
            per_metric,
            issues,
            score,
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&MetricUpdated) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    pub fn bus(&self) -> &ObservationBus<MetricUpdated> {
        &self.bus
    }

    pub fn clear(&self) {
        self.current.lock().clear();
    }
}
