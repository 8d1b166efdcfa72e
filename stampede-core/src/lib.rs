mod config;
mod error;
mod metrics;
mod runner;
mod schedule;
mod thresholds;

pub use config::{HealthGatePolicy, Scenario, Stage, WorkloadRequest};
pub use error::{Error, Result};
pub use metrics::{EngineMetrics, engine_metric_set, names};
pub use runner::{RunController, RunResult, StageScheduler, VuContext, VuState, VuStateCell, run_vu};
pub use schedule::{RampSchedule, StageSnapshot};
pub use thresholds::{
    ThresholdExpr, ThresholdSpec, ThresholdVerdict, evaluate_thresholds, parse_threshold_expr,
};
