pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Metrics(#[from] stampede_metrics::MetricsError),

    #[error("invalid base url `{0}` (expected http:// or https://)")]
    InvalidBaseUrl(String),

    #[error("`stages` must be a non-empty array of {{ duration, target }} with duration > 0")]
    InvalidStages,

    #[error("`max_vus` must be a positive integer")]
    InvalidMaxVus,

    #[error("`tick` must be a positive duration")]
    InvalidTick,

    #[error("`timeout` must be a positive duration")]
    InvalidTimeout,

    #[error("threshold references unknown metric `{0}`")]
    UnknownThresholdMetric(String),

    #[error("invalid threshold on `{metric}`: {reason}")]
    InvalidThreshold { metric: String, reason: String },

    #[error("health check against `{url}` failed: {reason}")]
    HealthCheck { url: String, reason: String },
}
