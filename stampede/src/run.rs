use anyhow::Context as _;

use stampede_core::{Error as CoreError, HealthGatePolicy, RunController, Scenario};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let scenario = load_scenario(&args).await?;
    let controller = RunController::new(scenario).map_err(classify)?;

    output::print_plan(controller.scenario());

    let cancel = controller.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, winding down");
            cancel.cancel();
        }
    });

    let result = controller.run().await.map_err(classify)?;
    output::print_summary(&result);

    Ok(if result.overall_pass() {
        ExitCode::Success
    } else {
        ExitCode::ThresholdsFailed
    })
}

async fn load_scenario(args: &RunArgs) -> Result<Scenario, RunError> {
    let raw = tokio::fs::read_to_string(&args.scenario)
        .await
        .with_context(|| format!("failed to read scenario: {}", args.scenario.display()))
        .map_err(RunError::RuntimeError)?;

    let mut scenario: Scenario = serde_yaml::from_str(&raw)
        .with_context(|| format!("malformed scenario: {}", args.scenario.display()))
        .map_err(RunError::InvalidInput)?;

    apply_overrides(&mut scenario, args);
    Ok(scenario)
}

fn apply_overrides(scenario: &mut Scenario, args: &RunArgs) {
    if let Some(base_url) = &args.base_url {
        scenario.base_url = base_url.clone();
    }
    if let Some(start_vus) = args.start_vus {
        scenario.start_vus = start_vus;
    }
    if let Some(max_vus) = args.max_vus {
        scenario.max_vus = Some(max_vus);
    }
    if let Some(think_time) = args.think_time {
        scenario.think_time = think_time;
    }
    if let Some(timeout) = args.timeout {
        scenario.request.timeout = timeout;
    }
    if args.strict_health {
        scenario.health_policy = HealthGatePolicy::HardFail;
    }
}

/// Scenario mistakes are the operator's to fix; everything else is ours.
fn classify(err: CoreError) -> RunError {
    match err {
        CoreError::InvalidBaseUrl(_)
        | CoreError::InvalidStages
        | CoreError::InvalidMaxVus
        | CoreError::InvalidTick
        | CoreError::InvalidTimeout
        | CoreError::UnknownThresholdMetric(_)
        | CoreError::InvalidThreshold { .. } => RunError::InvalidInput(err.into()),
        _ => RunError::RuntimeError(err.into()),
    }
}
