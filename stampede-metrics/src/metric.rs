use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::snapshot::{MetricSummary, TrendSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Trend,
    Rate,
}

pub(crate) fn new_trend_histogram() -> Histogram<u64> {
    // Values are recorded scaled x1000, so this covers up to 60M in source
    // units (e.g. 60_000s when samples are milliseconds) at 3 sigfigs.
    Histogram::<u64>::new_with_bounds(1, 60_000_000_000, 3)
        .unwrap_or_else(|err| panic!("failed to init histogram: {err}"))
}

#[derive(Debug)]
struct TrendAgg {
    count: AtomicU64,
    sum_scaled: AtomicU64,
    min_scaled: AtomicU64,
    max_scaled: AtomicU64,
    hist: Mutex<Histogram<u64>>,
}

impl TrendAgg {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_scaled: AtomicU64::new(0),
            min_scaled: AtomicU64::new(u64::MAX),
            max_scaled: AtomicU64::new(0),
            hist: Mutex::new(new_trend_histogram()),
        }
    }

    fn record(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let scaled = (value * 1000.0).round();
        if scaled <= 0.0 {
            return;
        }
        let scaled = scaled as u64;

        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_scaled.fetch_add(scaled, Ordering::Relaxed);

        let mut cur = self.min_scaled.load(Ordering::Relaxed);
        while scaled < cur {
            match self.min_scaled.compare_exchange_weak(
                cur,
                scaled,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(v) => cur = v,
            }
        }

        let mut cur = self.max_scaled.load(Ordering::Relaxed);
        while scaled > cur {
            match self.max_scaled.compare_exchange_weak(
                cur,
                scaled,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(v) => cur = v,
            }
        }

        let mut h = self.hist.lock();
        let _ = h.record(scaled);
    }

    fn snapshot(&self) -> TrendSnapshot {
        // The histogram clone makes the snapshot structurally independent:
        // writes after this point cannot perturb it.
        let hist = self.hist.lock().clone();
        let count = self.count.load(Ordering::Relaxed);

        TrendSnapshot {
            count,
            sum_scaled: self.sum_scaled.load(Ordering::Relaxed),
            min_scaled: (count > 0).then(|| self.min_scaled.load(Ordering::Relaxed)),
            max_scaled: (count > 0).then(|| self.max_scaled.load(Ordering::Relaxed)),
            hist,
        }
    }
}

#[derive(Debug, Default)]
struct RateAgg {
    total: AtomicU64,
    trues: AtomicU64,
}

impl RateAgg {
    fn add(&self, v: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if v {
            self.trues.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug)]
pub(crate) enum Storage {
    Counter(AtomicU64),
    Trend(TrendAgg),
    Rate(RateAgg),
}

impl Storage {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Storage::Counter(AtomicU64::new(0)),
            MetricKind::Trend => Storage::Trend(TrendAgg::new()),
            MetricKind::Rate => Storage::Rate(RateAgg::default()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Metric {
    name: Arc<str>,
    kind: MetricKind,
    storage: Storage,
}

impl Metric {
    pub(crate) fn new(name: Arc<str>, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            storage: Storage::new(kind),
        }
    }

    pub(crate) fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub(crate) fn summarize(&self) -> MetricSummary {
        match &self.storage {
            Storage::Counter(c) => MetricSummary::Counter {
                value: c.load(Ordering::Relaxed),
            },
            Storage::Trend(t) => MetricSummary::Trend(t.snapshot()),
            Storage::Rate(r) => MetricSummary::Rate {
                total: r.total.load(Ordering::Relaxed),
                trues: r.trues.load(Ordering::Relaxed),
            },
        }
    }
}

/// Cheap, cloneable write handle bound to one registered metric.
///
/// Writes to a handle of the wrong kind are ignored, matching how recording
/// behaves elsewhere in the aggregation layer; the engine resolves handles
/// against a fixed catalogue, so a mismatch is a programming error rather
/// than something worth a per-write branch to the caller.
#[derive(Debug, Clone)]
pub struct MetricHandle {
    metric: Arc<Metric>,
}

impl MetricHandle {
    pub(crate) fn new(metric: Arc<Metric>) -> Self {
        Self { metric }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.metric.name
    }

    #[must_use]
    pub fn kind(&self) -> MetricKind {
        self.metric.kind
    }

    #[inline]
    pub fn increment(&self, delta: u64) {
        if let Storage::Counter(c) = &self.metric.storage {
            c.fetch_add(delta, Ordering::Relaxed);
        }
    }

    /// Records one trend sample. Non-finite and non-positive values are
    /// dropped (the histogram floor is one scaled unit), so a trend's
    /// `count` reflects recorded samples, not call attempts — a threshold
    /// like `count>N` observes the difference.
    #[inline]
    pub fn record(&self, value: f64) {
        if let Storage::Trend(t) = &self.metric.storage {
            t.record(value);
        }
    }

    #[inline]
    pub fn record_bool(&self, value: bool) {
        if let Storage::Rate(r) = &self.metric.storage {
            r.add(value);
        }
    }
}
