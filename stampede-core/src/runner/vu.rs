use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use serde::Deserialize;
use stampede_http::{HttpClient, HttpRequest, OutcomeStatus, RequestOutcome};
use tokio_util::sync::CancellationToken;

use crate::metrics::EngineMetrics;

/// Lifecycle of one VU task, readable from outside the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum VuState {
    /// Between iterations (thinking) or not yet started.
    Idle = 0,
    /// A request is in flight.
    Running = 1,
    /// The loop has exited; the task is done.
    Stopped = 2,
}

#[derive(Debug, Default)]
pub struct VuStateCell(AtomicU8);

impl VuStateCell {
    pub fn get(&self) -> VuState {
        match self.0.load(Ordering::Acquire) {
            1 => VuState::Running,
            2 => VuState::Stopped,
            _ => VuState::Idle,
        }
    }

    /// The scheduler keeps counting a VU toward the population until its
    /// cell reads `Stopped`, so a VU body must report here when it exits.
    pub fn set(&self, state: VuState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Everything one VU needs, passed explicitly at spawn time.
#[derive(Debug)]
pub struct VuContext {
    pub vu_id: u64,
    /// Owned per VU; connection timing attribution relies on the client
    /// never being shared.
    pub client: HttpClient,
    pub request: HttpRequest,
    pub think_time: Duration,
    pub acceptable_statuses: Arc<[u16]>,
    pub metrics: Arc<EngineMetrics>,
    pub state: Arc<VuStateCell>,
    pub cancel: CancellationToken,
}

/// Fields the reference workload reports in its 200 bodies. Anything else in
/// the JSON is ignored.
#[derive(Debug, Deserialize)]
struct WorkReport {
    cpu_time_sec: Option<f64>,
    io_time_sec: Option<f64>,
}

/// The VU loop: issue a request, record its outcome, think, repeat.
///
/// Cancellation is only observed between iterations; an in-flight request is
/// always allowed to finish and be recorded, so a ramp-down never produces
/// phantom aborted samples.
pub async fn run_vu(ctx: VuContext) {
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        ctx.state.set(VuState::Running);
        let outcome = ctx.client.execute(&ctx.request).await;
        record_outcome(&ctx.metrics, &ctx.acceptable_statuses, &outcome);
        ctx.state.set(VuState::Idle);

        tokio::select! {
            () = ctx.cancel.cancelled() => break,
            () = tokio::time::sleep(ctx.think_time) => {}
        }
    }

    ctx.state.set(VuState::Stopped);
    tracing::debug!(vu_id = ctx.vu_id, "vu stopped");
}

fn as_millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

/// Classifies one finished attempt into the metric catalogue.
fn record_outcome(metrics: &EngineMetrics, acceptable: &[u16], outcome: &RequestOutcome) {
    metrics.http_reqs.increment(1);
    metrics
        .latency_total_ms
        .record(as_millis(outcome.duration_total));
    metrics
        .latency_server_ms
        .record(as_millis(outcome.duration_wait));
    metrics.latency_queue_ms.record(as_millis(
        outcome.duration_blocked + outcome.duration_connect,
    ));

    match outcome.status {
        OutcomeStatus::Status(code) => {
            match code {
                200 => {
                    metrics.successful_requests.increment(1);
                    record_work_report(metrics, outcome);
                }
                429 => metrics.throttled_requests.increment(1),
                c if c >= 500 => metrics.server_errors.increment(1),
                _ => {}
            }

            let acceptable = acceptable.contains(&code);
            metrics.checks.record_bool(acceptable);
            metrics
                .http_req_failed
                .record_bool(code >= 400 && !acceptable);
        }
        OutcomeStatus::Timeout | OutcomeStatus::NetworkError(_) => {
            metrics.checks.record_bool(false);
            metrics.http_req_failed.record_bool(true);
        }
    }
}

fn record_work_report(metrics: &EngineMetrics, outcome: &RequestOutcome) {
    let Some(body) = outcome.body.as_deref() else {
        return;
    };

    match serde_json::from_slice::<WorkReport>(body) {
        Ok(report) => {
            if let Some(cpu) = report.cpu_time_sec {
                metrics.custom_cpu_time_ms.record(cpu * 1_000.0);
            }
            if let Some(io) = report.io_time_sec {
                metrics.custom_io_time_ms.record(io * 1_000.0);
            }
        }
        // A 200 with an unparseable body still counts as a success; the
        // custom trends just miss a sample.
        Err(err) => tracing::warn!(error = %err, "unparseable 200 response body"),
    }
}
