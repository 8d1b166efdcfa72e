use stampede_metrics::{MetricHandle, MetricSet, MetricsError};

/// The engine's fixed metric catalogue.
///
/// Every name a run can record (or a threshold can reference) is declared
/// here; a typo'd name is a startup error, never a silent runtime miss.
pub mod names {
    /// Full round-trip time per request, milliseconds.
    pub const LATENCY_TOTAL_MS: &str = "latency_total_ms";
    /// Time from request dispatch to response head, milliseconds.
    pub const LATENCY_SERVER_MS: &str = "latency_server_ms";
    /// Pre-dispatch queueing plus connection setup, milliseconds.
    pub const LATENCY_QUEUE_MS: &str = "latency_queue_ms";
    /// Server-reported CPU time parsed from 200 response bodies.
    pub const CUSTOM_CPU_TIME_MS: &str = "custom_cpu_time_ms";
    /// Server-reported I/O time parsed from 200 response bodies.
    pub const CUSTOM_IO_TIME_MS: &str = "custom_io_time_ms";

    pub const HTTP_REQS: &str = "http_reqs";
    pub const SUCCESSFUL_REQUESTS: &str = "successful_requests";
    pub const THROTTLED_REQUESTS: &str = "throttled_requests";
    pub const SERVER_ERRORS: &str = "server_errors";

    /// Share of requests that failed (timeout, network error, or an
    /// unacceptable status >= 400).
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    /// Share of requests whose status landed in the acceptable set.
    pub const CHECKS: &str = "checks";
}

pub fn engine_metric_set() -> std::result::Result<MetricSet, MetricsError> {
    MetricSet::builder()
        .trend(names::LATENCY_TOTAL_MS)
        .trend(names::LATENCY_SERVER_MS)
        .trend(names::LATENCY_QUEUE_MS)
        .trend(names::CUSTOM_CPU_TIME_MS)
        .trend(names::CUSTOM_IO_TIME_MS)
        .counter(names::HTTP_REQS)
        .counter(names::SUCCESSFUL_REQUESTS)
        .counter(names::THROTTLED_REQUESTS)
        .counter(names::SERVER_ERRORS)
        .rate(names::HTTP_REQ_FAILED)
        .rate(names::CHECKS)
        .build()
}

/// Pre-resolved write handles for the hot path; VUs never look metrics up
/// by name mid-run.
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub latency_total_ms: MetricHandle,
    pub latency_server_ms: MetricHandle,
    pub latency_queue_ms: MetricHandle,
    pub custom_cpu_time_ms: MetricHandle,
    pub custom_io_time_ms: MetricHandle,
    pub http_reqs: MetricHandle,
    pub successful_requests: MetricHandle,
    pub throttled_requests: MetricHandle,
    pub server_errors: MetricHandle,
    pub http_req_failed: MetricHandle,
    pub checks: MetricHandle,
}

impl EngineMetrics {
    pub fn resolve(set: &MetricSet) -> std::result::Result<Self, MetricsError> {
        Ok(Self {
            latency_total_ms: set.handle(names::LATENCY_TOTAL_MS)?,
            latency_server_ms: set.handle(names::LATENCY_SERVER_MS)?,
            latency_queue_ms: set.handle(names::LATENCY_QUEUE_MS)?,
            custom_cpu_time_ms: set.handle(names::CUSTOM_CPU_TIME_MS)?,
            custom_io_time_ms: set.handle(names::CUSTOM_IO_TIME_MS)?,
            http_reqs: set.handle(names::HTTP_REQS)?,
            successful_requests: set.handle(names::SUCCESSFUL_REQUESTS)?,
            throttled_requests: set.handle(names::THROTTLED_REQUESTS)?,
            server_errors: set.handle(names::SERVER_ERRORS)?,
            http_req_failed: set.handle(names::HTTP_REQ_FAILED)?,
            checks: set.handle(names::CHECKS)?,
        })
    }
}
