use hdrhistogram::Histogram;
use std::collections::HashMap;
use std::sync::Arc;

/// Point-in-time copy of one trend's distribution.
///
/// Internally everything is scaled x1000 (the recording resolution); the
/// accessors convert back to source units. `count` covers recorded samples
/// only: zero, negative, and non-finite values are dropped at record time.
#[derive(Debug, Clone)]
pub struct TrendSnapshot {
    pub count: u64,
    pub(crate) sum_scaled: u64,
    pub(crate) min_scaled: Option<u64>,
    pub(crate) max_scaled: Option<u64>,
    pub(crate) hist: Histogram<u64>,
}

impl TrendSnapshot {
    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.min_scaled.map(|v| v as f64 / 1000.0)
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.max_scaled.map(|v| v as f64 / 1000.0)
    }

    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum_scaled as f64 / self.count as f64 / 1000.0)
    }

    /// Value at percentile `p` (0 < p <= 100).
    ///
    /// Answered by `hdrhistogram`'s closest-rank lookup at 3 significant
    /// digits of resolution. This is the one interpolation rule used
    /// everywhere thresholds are evaluated; re-querying the same snapshot
    /// always returns the same value.
    #[must_use]
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.hist.is_empty() || !(0.0..=100.0).contains(&p) {
            return None;
        }
        Some(self.hist.value_at_quantile(p / 100.0) as f64 / 1000.0)
    }
}

#[derive(Debug, Clone)]
pub enum MetricSummary {
    Counter { value: u64 },
    Trend(TrendSnapshot),
    Rate { total: u64, trues: u64 },
}

impl MetricSummary {
    /// Sample count: counter value, trend sample count, or rate total.
    #[must_use]
    pub fn count(&self) -> u64 {
        match self {
            MetricSummary::Counter { value } => *value,
            MetricSummary::Trend(t) => t.count,
            MetricSummary::Rate { total, .. } => *total,
        }
    }

    #[must_use]
    pub fn rate(&self) -> Option<f64> {
        match self {
            MetricSummary::Rate { total, trues } => {
                (*total > 0).then(|| *trues as f64 / *total as f64)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn as_trend(&self) -> Option<&TrendSnapshot> {
        match self {
            MetricSummary::Trend(t) => Some(t),
            _ => None,
        }
    }
}

/// Immutable view over every registered metric, taken at one instant.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    metrics: HashMap<Arc<str>, MetricSummary>,
}

impl MetricsSnapshot {
    pub(crate) fn new(metrics: HashMap<Arc<str>, MetricSummary>) -> Self {
        Self { metrics }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        match self.metrics.get(name)? {
            MetricSummary::Counter { value } => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Metric names and summaries, sorted by name for stable reporting.
    #[must_use]
    pub fn sorted(&self) -> Vec<(&str, &MetricSummary)> {
        let mut out: Vec<(&str, &MetricSummary)> = self
            .metrics
            .iter()
            .map(|(name, summary)| (name.as_ref(), summary))
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }
}
