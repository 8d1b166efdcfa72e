use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::metrics::engine_metric_set;
use crate::thresholds::{ThresholdSpec, parse_threshold_expr};

/// One leg of the ramp plan: reach `target` VUs over `duration`, starting
/// from wherever the previous stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Stage {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub target: u64,
}

/// What to do when the pre-run health probe fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthGatePolicy {
    /// Log a warning and start the run anyway.
    #[default]
    Warn,
    /// Refuse to start the run.
    HardFail,
}

/// The request every VU iteration issues.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadRequest {
    pub path: String,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for WorkloadRequest {
    fn default() -> Self {
        Self {
            path: "/heavy/cpu-io-no-db/".to_string(),
            query: BTreeMap::from([
                ("prime_limit".to_string(), "500000".to_string()),
                ("hash_rounds".to_string(), "1000000".to_string()),
                ("io_kb".to_string(), "128".to_string()),
            ]),
            timeout: default_timeout(),
        }
    }
}

impl WorkloadRequest {
    /// Resolves the request path and query against a base URL.
    pub fn url(&self, base: &Url) -> Result<Url> {
        let mut url = base
            .join(&self.path)
            .map_err(|_| Error::InvalidBaseUrl(base.to_string()))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_health_path() -> String {
    "/heavy/health/".to_string()
}

fn default_think_time() -> Duration {
    Duration::from_secs(1)
}

fn default_tick() -> Duration {
    Duration::from_millis(250)
}

fn default_acceptable_statuses() -> Vec<u16> {
    vec![200, 429]
}

/// A complete run description, typically deserialized from a YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub base_url: String,

    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default)]
    pub health_policy: HealthGatePolicy,

    #[serde(default)]
    pub request: WorkloadRequest,

    /// Pause between iterations of each VU loop.
    #[serde(default = "default_think_time", with = "humantime_serde")]
    pub think_time: Duration,

    #[serde(default)]
    pub start_vus: u64,
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub max_vus: Option<u64>,

    /// Reconciliation interval of the stage scheduler.
    #[serde(default = "default_tick", with = "humantime_serde")]
    pub tick: Duration,

    /// Statuses counted as a passing check. Anything else >= 400 (plus
    /// timeouts and network errors) counts toward `http_req_failed`.
    #[serde(default = "default_acceptable_statuses")]
    pub acceptable_statuses: Vec<u16>,

    /// Metric name -> threshold expressions, e.g.
    /// `latency_total_ms: ["p(95)<5000"]`.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
}

impl Scenario {
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url)
            .map_err(|_| Error::InvalidBaseUrl(self.base_url.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(url)
    }

    pub fn health_url(&self) -> Result<Url> {
        let base = self.base_url()?;
        base.join(&self.health_path)
            .map_err(|_| Error::InvalidBaseUrl(self.base_url.clone()))
    }

    /// Rejects every malformed field before any VU is spawned.
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        self.health_url()?;

        if self.stages.is_empty() || self.stages.iter().any(|s| s.duration.is_zero()) {
            return Err(Error::InvalidStages);
        }
        if self.max_vus == Some(0) {
            return Err(Error::InvalidMaxVus);
        }
        if self.tick.is_zero() {
            return Err(Error::InvalidTick);
        }
        if self.request.timeout.is_zero() {
            return Err(Error::InvalidTimeout);
        }

        let catalogue = engine_metric_set()?;
        for (metric, exprs) in &self.thresholds {
            if !catalogue.contains(metric) {
                return Err(Error::UnknownThresholdMetric(metric.clone()));
            }
            for raw in exprs {
                parse_threshold_expr(raw).map_err(|reason| Error::InvalidThreshold {
                    metric: metric.clone(),
                    reason,
                })?;
            }
        }

        Ok(())
    }

    pub fn threshold_specs(&self) -> Vec<ThresholdSpec> {
        self.thresholds
            .iter()
            .map(|(metric, exprs)| ThresholdSpec {
                metric: metric.clone(),
                expressions: exprs.clone(),
            })
            .collect()
    }
}
