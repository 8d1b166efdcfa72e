use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use stampede_http::{HttpClient, HttpRequest, OutcomeStatus};
use stampede_metrics::MetricsSnapshot;
use tokio_util::sync::CancellationToken;

use crate::config::{HealthGatePolicy, Scenario};
use crate::error::{Error, Result};
use crate::metrics::{EngineMetrics, engine_metric_set};
use crate::runner::scheduler::StageScheduler;
use crate::runner::vu::{VuContext, run_vu};
use crate::schedule::RampSchedule;
use crate::thresholds::{ThresholdVerdict, evaluate_thresholds};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunResult {
    pub started_at: SystemTime,
    pub ended_at: SystemTime,
    pub elapsed: Duration,
    pub snapshot: MetricsSnapshot,
    pub verdicts: Vec<ThresholdVerdict>,
}

impl RunResult {
    /// A run passes only when every threshold expression passed.
    #[must_use]
    pub fn overall_pass(&self) -> bool {
        self.verdicts.iter().all(|v| v.passed)
    }
}

/// Owns one run end to end: health gate, ramp execution, final snapshot and
/// threshold evaluation.
pub struct RunController {
    scenario: Scenario,
    cancel: CancellationToken,
}

impl RunController {
    /// Validates the scenario up front; a controller only exists for a
    /// runnable scenario.
    pub fn new(scenario: Scenario) -> Result<Self> {
        scenario.validate()?;
        Ok(Self {
            scenario,
            cancel: CancellationToken::new(),
        })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Token for external shutdown (ctrl-c and the like). Cancelling it ends
    /// the run early but still drains VUs and evaluates thresholds over what
    /// was collected.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<RunResult> {
        self.health_gate().await?;

        let set = engine_metric_set()?;
        let metrics = Arc::new(EngineMetrics::resolve(&set)?);

        let base = self.scenario.base_url()?;
        let url = self.scenario.request.url(&base)?;
        let request =
            HttpRequest::get(url.as_str()).with_timeout(self.scenario.request.timeout);

        let schedule = RampSchedule::new(self.scenario.start_vus, self.scenario.stages.clone());
        tracing::info!(
            stages = schedule.stages().len(),
            peak_vus = schedule.peak_target(),
            total = ?schedule.total_duration(),
            %url,
            "starting run"
        );

        let scheduler = StageScheduler::new(schedule, self.scenario.tick, self.scenario.max_vus);

        let acceptable: Arc<[u16]> = self.scenario.acceptable_statuses.clone().into();
        let think_time = self.scenario.think_time;

        let started_at = SystemTime::now();
        let started = Instant::now();

        scheduler
            .run(&self.cancel, |vu_id, cancel, state| {
                run_vu(VuContext {
                    vu_id,
                    client: HttpClient::default(),
                    request: request.clone(),
                    think_time,
                    acceptable_statuses: acceptable.clone(),
                    metrics: metrics.clone(),
                    state,
                    cancel,
                })
            })
            .await?;

        let elapsed = started.elapsed();
        let ended_at = SystemTime::now();
        let snapshot = set.snapshot();
        let verdicts =
            evaluate_thresholds(&self.scenario.threshold_specs(), &snapshot, elapsed);

        Ok(RunResult {
            started_at,
            ended_at,
            elapsed,
            snapshot,
            verdicts,
        })
    }

    /// Probes the health endpoint once before any load is applied.
    async fn health_gate(&self) -> Result<()> {
        let url = self.scenario.health_url()?;
        let client = HttpClient::default();
        let request = HttpRequest::get(url.as_str()).with_timeout(HEALTH_TIMEOUT);
        let outcome = client.execute(&request).await;

        let reason = match outcome.status {
            OutcomeStatus::Status(code) if (200..300).contains(&code) => {
                tracing::info!(%url, "health check passed");
                return Ok(());
            }
            OutcomeStatus::Status(code) => format!("status {code}"),
            OutcomeStatus::Timeout => "timed out".to_string(),
            OutcomeStatus::NetworkError(kind) => format!("network error ({kind})"),
        };

        match self.scenario.health_policy {
            HealthGatePolicy::Warn => {
                tracing::warn!(%url, %reason, "health check failed, starting anyway");
                Ok(())
            }
            HealthGatePolicy::HardFail => Err(Error::HealthCheck {
                url: url.to_string(),
                reason,
            }),
        }
    }
}
