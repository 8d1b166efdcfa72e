use std::time::Duration;

use stampede_metrics::{MetricSummary, MetricsSnapshot};

/// One metric plus the expressions asserted against it, e.g.
/// `latency_total_ms: ["p(95)<5000", "p(99)<8000"]`.
#[derive(Debug, Clone)]
pub struct ThresholdSpec {
    pub metric: String,
    pub expressions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Count,
    Rate,
    P(u32),
}

#[derive(Debug, Clone)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

/// Outcome of evaluating one expression against one metric.
#[derive(Debug, Clone)]
pub struct ThresholdVerdict {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Find operator
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = if left.eq_ignore_ascii_case("avg") {
        ThresholdAgg::Avg
    } else if left.eq_ignore_ascii_case("min") {
        ThresholdAgg::Min
    } else if left.eq_ignore_ascii_case("max") {
        ThresholdAgg::Max
    } else if left.eq_ignore_ascii_case("count") {
        ThresholdAgg::Count
    } else if left.eq_ignore_ascii_case("rate") {
        ThresholdAgg::Rate
    } else if let Some(inner) = left.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) {
        let p: u32 = inner
            .parse()
            .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
        if !(1..=100).contains(&p) {
            return Err(format!("percentile out of range in threshold: {raw}"));
        }
        ThresholdAgg::P(p)
    } else {
        return Err(format!("unknown aggregation `{left}` in threshold: {raw}"));
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value in threshold: {raw}"))?;

    Ok(ThresholdExpr { agg, op, value })
}

/// Evaluates every expression of every spec independently.
///
/// Fail-closed by construction: a metric missing from the snapshot, an
/// unparseable expression, or a statistic the metric kind cannot answer all
/// produce `passed = false` with `observed = None`. A run is only allowed to
/// pass on evidence that exists.
pub fn evaluate_thresholds(
    specs: &[ThresholdSpec],
    snapshot: &MetricsSnapshot,
    run_duration: Duration,
) -> Vec<ThresholdVerdict> {
    let mut out = Vec::new();

    for spec in specs {
        let summary = snapshot.get(&spec.metric);

        for raw in &spec.expressions {
            let observed = parse_threshold_expr(raw).ok().and_then(|expr| {
                summary
                    .and_then(|s| observed_value(s, &expr.agg, run_duration))
                    .map(|v| (v, expr))
            });

            let (observed, passed) = match observed {
                Some((v, expr)) => (Some(v), compare(v, expr.op, expr.value)),
                None => (None, false),
            };

            out.push(ThresholdVerdict {
                metric: spec.metric.clone(),
                expression: raw.clone(),
                observed,
                passed,
            });
        }
    }

    out
}

fn compare(left: f64, op: ThresholdOp, right: f64) -> bool {
    match op {
        ThresholdOp::Lt => left < right,
        ThresholdOp::Lte => left <= right,
        ThresholdOp::Gt => left > right,
        ThresholdOp::Gte => left >= right,
        ThresholdOp::Eq => left == right,
    }
}

fn observed_value(summary: &MetricSummary, agg: &ThresholdAgg, run_duration: Duration) -> Option<f64> {
    match (summary, agg) {
        (MetricSummary::Trend(t), ThresholdAgg::Avg) => t.mean(),
        (MetricSummary::Trend(t), ThresholdAgg::Min) => t.min(),
        (MetricSummary::Trend(t), ThresholdAgg::Max) => t.max(),
        (MetricSummary::Trend(t), ThresholdAgg::Count) => Some(t.count as f64),
        (MetricSummary::Trend(t), ThresholdAgg::P(p)) => t.percentile(f64::from(*p)),

        (MetricSummary::Counter { value }, ThresholdAgg::Count) => Some(*value as f64),
        // Counter rate is per-second throughput over the whole run.
        (MetricSummary::Counter { value }, ThresholdAgg::Rate) => {
            let secs = run_duration.as_secs_f64();
            (secs > 0.0).then(|| *value as f64 / secs)
        }

        (MetricSummary::Rate { .. }, ThresholdAgg::Rate) => summary.rate(),
        (MetricSummary::Rate { total, .. }, ThresholdAgg::Count) => Some(*total as f64),

        // Non-sensical combinations.
        (_, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{engine_metric_set, names};

    fn spec(metric: &str, exprs: &[&str]) -> ThresholdSpec {
        ThresholdSpec {
            metric: metric.to_string(),
            expressions: exprs.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn parse_threshold_expr_trims_whitespace() {
        let expr = parse_threshold_expr("  avg  <=  123  ").unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(expr.agg, ThresholdAgg::Avg));
        assert!(matches!(expr.op, ThresholdOp::Lte));
        assert_eq!(expr.value, 123.0);
    }

    #[test]
    fn parse_threshold_expr_accepts_percentiles_and_rates() {
        let expr = parse_threshold_expr("p(95)<5000").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(expr.agg, ThresholdAgg::P(95));
        assert!(matches!(expr.op, ThresholdOp::Lt));

        let expr = parse_threshold_expr("rate<0.01").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(expr.agg, ThresholdAgg::Rate);
        assert_eq!(expr.value, 0.01);
    }

    #[test]
    fn parse_threshold_expr_rejects_out_of_range_percentiles() {
        let err = match parse_threshold_expr("p(101)<1") {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(err.contains("out of range"));
    }

    #[test]
    fn percentile_threshold_compares_against_distribution() {
        let set = engine_metric_set().unwrap_or_else(|e| panic!("{e}"));
        let latency = set
            .handle(names::LATENCY_TOTAL_MS)
            .unwrap_or_else(|e| panic!("{e}"));

        // 100 samples climbing to 4800ms; p95 lands at 4800.
        for i in 1..=95 {
            latency.record(f64::from(i) * 50.0);
        }
        for _ in 96..=100 {
            latency.record(4800.0);
        }

        let specs = [spec(names::LATENCY_TOTAL_MS, &["p(95)<5000"])];
        let verdicts = evaluate_thresholds(&specs, &set.snapshot(), Duration::from_secs(10));
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].passed, "observed={:?}", verdicts[0].observed);

        let specs = [spec(names::LATENCY_TOTAL_MS, &["p(95)<4000"])];
        let verdicts = evaluate_thresholds(&specs, &set.snapshot(), Duration::from_secs(10));
        assert!(!verdicts[0].passed);
    }

    #[test]
    fn missing_metric_fails_closed() {
        let set = engine_metric_set().unwrap_or_else(|e| panic!("{e}"));
        let specs = [spec("nonexistent_metric", &["count<10"])];

        let verdicts = evaluate_thresholds(&specs, &set.snapshot(), Duration::from_secs(1));
        assert_eq!(verdicts.len(), 1);
        assert!(!verdicts[0].passed);
        assert_eq!(verdicts[0].observed, None);
    }

    #[test]
    fn empty_trend_fails_percentile_threshold() {
        let set = engine_metric_set().unwrap_or_else(|e| panic!("{e}"));
        let specs = [spec(names::CUSTOM_CPU_TIME_MS, &["p(95)<5000"])];

        // The metric exists but nothing was ever recorded; a run that never
        // exercised the measured path must not silently pass.
        let verdicts = evaluate_thresholds(&specs, &set.snapshot(), Duration::from_secs(1));
        assert!(!verdicts[0].passed);
        assert_eq!(verdicts[0].observed, None);
    }

    #[test]
    fn counter_rate_is_per_second_throughput() {
        let set = engine_metric_set().unwrap_or_else(|e| panic!("{e}"));
        let reqs = set.handle(names::HTTP_REQS).unwrap_or_else(|e| panic!("{e}"));
        for _ in 0..300 {
            reqs.increment(1);
        }

        let specs = [spec(names::HTTP_REQS, &["rate>20"])];
        let verdicts = evaluate_thresholds(&specs, &set.snapshot(), Duration::from_secs(10));
        assert!(verdicts[0].passed, "observed={:?}", verdicts[0].observed);
        assert_eq!(verdicts[0].observed, Some(30.0));

        let verdicts = evaluate_thresholds(&specs, &set.snapshot(), Duration::from_secs(60));
        assert!(!verdicts[0].passed);
    }

    #[test]
    fn rate_metric_threshold_uses_proportion() {
        let set = engine_metric_set().unwrap_or_else(|e| panic!("{e}"));
        let failed = set
            .handle(names::HTTP_REQ_FAILED)
            .unwrap_or_else(|e| panic!("{e}"));
        for i in 0..1000 {
            failed.record_bool(i % 200 == 0); // 0.5% failure rate
        }

        let specs = [spec(names::HTTP_REQ_FAILED, &["rate<0.01"])];
        let verdicts = evaluate_thresholds(&specs, &set.snapshot(), Duration::from_secs(10));
        assert!(verdicts[0].passed);
    }

    #[test]
    fn every_expression_is_judged_independently() {
        let set = engine_metric_set().unwrap_or_else(|e| panic!("{e}"));
        let latency = set
            .handle(names::LATENCY_TOTAL_MS)
            .unwrap_or_else(|e| panic!("{e}"));
        latency.record(1000.0);

        let specs = [spec(names::LATENCY_TOTAL_MS, &["p(50)<2000", "max<500"])];
        let verdicts = evaluate_thresholds(&specs, &set.snapshot(), Duration::from_secs(1));
        assert_eq!(verdicts.len(), 2);
        assert!(verdicts[0].passed);
        assert!(!verdicts[1].passed);
    }
}
