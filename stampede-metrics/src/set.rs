use std::collections::HashMap;
use std::sync::Arc;

use crate::metric::{Metric, MetricHandle, MetricKind};
use crate::snapshot::MetricsSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metric `{0}` is not registered")]
    Unregistered(String),

    #[error("metric `{0}` is registered twice")]
    Duplicate(String),
}

#[derive(Debug, Clone)]
pub struct MetricSpec {
    pub name: String,
    pub kind: MetricKind,
}

/// Declares the full metric catalogue before the run starts.
///
/// There is no get-or-create path at record time: a name that was never
/// declared surfaces as a [`MetricsError::Unregistered`] when the handle is
/// resolved, which happens during startup validation.
#[derive(Debug, Default)]
pub struct MetricSetBuilder {
    specs: Vec<MetricSpec>,
}

impl MetricSetBuilder {
    #[must_use]
    pub fn counter(self, name: &str) -> Self {
        self.register(name, MetricKind::Counter)
    }

    #[must_use]
    pub fn trend(self, name: &str) -> Self {
        self.register(name, MetricKind::Trend)
    }

    #[must_use]
    pub fn rate(self, name: &str) -> Self {
        self.register(name, MetricKind::Rate)
    }

    #[must_use]
    pub fn register(mut self, name: &str, kind: MetricKind) -> Self {
        self.specs.push(MetricSpec {
            name: name.to_string(),
            kind,
        });
        self
    }

    pub fn build(self) -> Result<MetricSet, MetricsError> {
        let mut metrics: HashMap<Arc<str>, Arc<Metric>> = HashMap::with_capacity(self.specs.len());
        for spec in self.specs {
            let name: Arc<str> = Arc::from(spec.name.as_str());
            if metrics.contains_key(&name) {
                return Err(MetricsError::Duplicate(spec.name));
            }
            metrics.insert(name.clone(), Arc::new(Metric::new(name, spec.kind)));
        }
        Ok(MetricSet { metrics })
    }
}

/// Fixed name -> metric mapping shared by every writer.
///
/// Append-only during a run: writers go through pre-resolved
/// [`MetricHandle`]s, the single reader takes [`MetricSet::snapshot`]s.
#[derive(Debug)]
pub struct MetricSet {
    metrics: HashMap<Arc<str>, Arc<Metric>>,
}

impl MetricSet {
    #[must_use]
    pub fn builder() -> MetricSetBuilder {
        MetricSetBuilder::default()
    }

    pub fn handle(&self, name: &str) -> Result<MetricHandle, MetricsError> {
        self.metrics
            .get(name)
            .map(|m| MetricHandle::new(m.clone()))
            .ok_or_else(|| MetricsError::Unregistered(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let metrics = self
            .metrics
            .values()
            .map(|m| (m.name().clone(), m.summarize()))
            .collect();
        MetricsSnapshot::new(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> MetricSet {
        match MetricSet::builder()
            .counter("requests")
            .trend("latency_ms")
            .rate("failed")
            .build()
        {
            Ok(s) => s,
            Err(err) => panic!("{err}"),
        }
    }

    #[test]
    fn unregistered_name_is_an_error() {
        let set = set();
        assert!(matches!(
            set.handle("latency_mss"),
            Err(MetricsError::Unregistered(_))
        ));
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let built = MetricSet::builder().counter("x").trend("x").build();
        assert!(matches!(built, Err(MetricsError::Duplicate(_))));
    }

    #[test]
    fn snapshot_is_independent_of_later_writes() {
        let set = set();
        let latency = match set.handle("latency_ms") {
            Ok(h) => h,
            Err(err) => panic!("{err}"),
        };
        latency.record(100.0);
        latency.record(200.0);

        let snap = set.snapshot();
        let before = snap.get("latency_ms").and_then(|m| m.as_trend()).cloned();

        latency.record(10_000.0);

        let after = snap.get("latency_ms").and_then(|m| m.as_trend()).cloned();
        let (Some(before), Some(after)) = (before, after) else {
            panic!("missing trend");
        };
        assert_eq!(before.count, 2);
        assert_eq!(after.count, 2);
        assert_eq!(before.percentile(95.0), after.percentile(95.0));
        assert_eq!(before.max(), Some(200.0));
    }

    #[test]
    fn percentile_queries_are_idempotent() {
        let set = set();
        let latency = match set.handle("latency_ms") {
            Ok(h) => h,
            Err(err) => panic!("{err}"),
        };
        for i in 1..=100 {
            latency.record(f64::from(i) * 10.0);
        }

        let snap = set.snapshot();
        let t = match snap.get("latency_ms").and_then(|m| m.as_trend()) {
            Some(t) => t,
            None => panic!("missing trend"),
        };
        let first = t.percentile(95.0);
        for _ in 0..10 {
            assert_eq!(t.percentile(95.0), first);
        }
        assert!(first.is_some());
    }

    #[test]
    fn concurrent_writers_do_not_lose_updates() {
        let set = Arc::new(set());
        let requests = match set.handle("requests") {
            Ok(h) => h,
            Err(err) => panic!("{err}"),
        };
        let failed = match set.handle("failed") {
            Ok(h) => h,
            Err(err) => panic!("{err}"),
        };

        let writers = 16;
        let per_writer = 5_000u64;
        std::thread::scope(|scope| {
            for w in 0..writers {
                let requests = requests.clone();
                let failed = failed.clone();
                scope.spawn(move || {
                    for i in 0..per_writer {
                        requests.increment(1);
                        failed.record_bool((i + w) % 2 == 0);
                    }
                });
            }
        });

        let snap = set.snapshot();
        assert_eq!(snap.counter("requests"), Some(writers * per_writer));
        assert_eq!(
            snap.get("failed").map(|m| m.count()),
            Some(writers * per_writer)
        );
    }
}
