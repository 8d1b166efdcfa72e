use stampede_core::{RunResult, Scenario, names};
use stampede_metrics::MetricSummary;

fn format_duration(d: std::time::Duration) -> String {
    humantime::format_duration(std::time::Duration::from_secs(d.as_secs())).to_string()
}

/// Prints the ramp plan before any load is applied.
pub fn print_plan(scenario: &Scenario) {
    println!("target: {}{}", scenario.base_url, scenario.request.path);
    println!(
        "plan: start_vus={} think_time={}",
        scenario.start_vus,
        format_duration(scenario.think_time)
    );
    for (i, stage) in scenario.stages.iter().enumerate() {
        println!(
            "  stage {}/{}: {} -> {} vus",
            i + 1,
            scenario.stages.len(),
            format_duration(stage.duration),
            stage.target
        );
    }
    if let Some(max) = scenario.max_vus {
        println!("  capped at {max} vus");
    }
    println!();
}

/// Prints every collected metric plus the threshold verdicts.
pub fn print_summary(result: &RunResult) {
    let elapsed_secs = result.elapsed.as_secs_f64().max(1e-9);
    println!("run finished in {}", format_duration(result.elapsed));
    println!();

    for (name, summary) in result.snapshot.sorted() {
        match summary {
            MetricSummary::Counter { value } => {
                println!(
                    "  {name:.<28} count={value} rate={:.2}/s",
                    *value as f64 / elapsed_secs
                );
            }
            MetricSummary::Rate { total, trues } => {
                let pct = if *total > 0 {
                    *trues as f64 / *total as f64 * 100.0
                } else {
                    0.0
                };
                println!("  {name:.<28} {pct:.2}% ({trues}/{total})");
            }
            MetricSummary::Trend(t) => {
                let stat = |v: Option<f64>| {
                    v.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
                };
                println!(
                    "  {name:.<28} avg={} min={} max={} p(50)={} p(90)={} p(95)={} p(99)={} count={}",
                    stat(t.mean()),
                    stat(t.min()),
                    stat(t.max()),
                    stat(t.percentile(50.0)),
                    stat(t.percentile(90.0)),
                    stat(t.percentile(95.0)),
                    stat(t.percentile(99.0)),
                    t.count
                );
            }
        }
    }

    if let Some(reqs) = result.snapshot.counter(names::HTTP_REQS) {
        println!();
        println!("  {:.2} req/s over the whole run", reqs as f64 / elapsed_secs);
    }

    if !result.verdicts.is_empty() {
        println!();
        println!("thresholds:");
        for v in &result.verdicts {
            let mark = if v.passed { "PASS" } else { "FAIL" };
            match v.observed {
                Some(obs) => {
                    println!("  [{mark}] {}: {} (observed {obs:.2})", v.metric, v.expression);
                }
                None => {
                    println!("  [{mark}] {}: {} (no data)", v.metric, v.expression);
                }
            }
        }
    }
}
