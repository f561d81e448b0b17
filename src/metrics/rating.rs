use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelemetryError};

// ─── Rating ──────────────────────────────────────────────────────

/// Qualitative classification of a metric value. Ordered best → worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rating {
    Good,
    NeedsImprovement,
    Poor,
}

impl Rating {
    /// 100 / 50 / 0, averaged into the vitals score.
    pub fn score(self) -> f64 {
        match self {
            Rating::Good => 100.0,
            Rating::NeedsImprovement => 50.0,
            Rating::Poor => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Good => "good",
            Rating::NeedsImprovement => "needs-improvement",
            Rating::Poor => "poor",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Thresholds ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    Ms,
    Score,
}

impl MetricUnit {
    pub fn suffix(self) -> &'static str {
        match self {
            MetricUnit::Ms => "ms",
            MetricUnit::Score => "",
        }
    }
}

/// Upper bounds for "good" and "needs-improvement". Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingThreshold {
    pub good: f64,
    pub poor: f64,
    #[serde(default = "default_unit")]
    pub unit: MetricUnit,
}

fn default_unit() -> MetricUnit {
    MetricUnit::Ms
}

impl RatingThreshold {
    pub const fn ms(good: f64, poor: f64) -> Self {
        Self {
            good,
            poor,
            unit: MetricUnit::Ms,
        }
    }

    pub const fn score(good: f64, poor: f64) -> Self {
        Self {
            good,
            poor,
            unit: MetricUnit::Score,
        }
    }
}

/// Static `metric name -> threshold` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingThresholds {
    table: BTreeMap<String, RatingThreshold>,
}

impl RatingThresholds {
    pub fn empty() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// FCP, LCP, FID, CLS and TTFB with the published Core Web Vitals bounds.
    pub fn core_web_vitals() -> Self {
        let mut t = Self::empty();
        t.insert("FCP", RatingThreshold::ms(1800.0, 3000.0));
        t.insert("LCP", RatingThreshold::ms(2500.0, 4000.0));
        t.insert("FID", RatingThreshold::ms(100.0, 300.0));
        t.insert("CLS", RatingThreshold::score(0.1, 0.25));
        t.insert("TTFB", RatingThreshold::ms(800.0, 1800.0));
        t
    }

    pub fn insert(&mut self, name: impl Into<String>, threshold: RatingThreshold) {
        self.table.insert(name.into(), threshold);
    }

    pub fn get(&self, name: &str) -> Option<&RatingThreshold> {
        self.table.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RatingThreshold)> + '_ {
        self.table.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every entry must satisfy `good < poor`.
    pub fn validate(&self) -> Result<()> {
        for (name, t) in &self.table {
            if !(t.good < t.poor) {
                return Err(TelemetryError::InvalidConfig(format!(
                    "threshold for {name}: good ({}) must be below poor ({})",
                    t.good, t.poor
                )));
            }
        }
        Ok(())
    }
}

impl Default for RatingThresholds {
    fn default() -> Self {
        Self::core_web_vitals()
    }
}

// ─── Classifier ──────────────────────────────────────────────────

/// Rate `value` against the threshold registered for `name`.
pub fn classify(name: &str, value: f64, thresholds: &RatingThresholds) -> Result<Rating> {
    let t = thresholds
        .get(name)
        .ok_or_else(|| TelemetryError::UnknownMetric(name.to_owned()))?;

    Ok(if value <= t.good {
        Rating::Good
    } else if value <= t.poor {
        Rating::NeedsImprovement
    } else {
        Rating::Poor
    })
}
