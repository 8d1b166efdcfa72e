mod metric;
mod set;
mod snapshot;

pub use metric::{MetricHandle, MetricKind};
pub use set::{MetricSet, MetricSetBuilder, MetricSpec, MetricsError};
pub use snapshot::{MetricSummary, MetricsSnapshot, TrendSnapshot};
