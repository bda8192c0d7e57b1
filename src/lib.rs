//! Local storage, filtering, aggregation and retention of timestamped
//! device metrics.

pub mod cli;
pub mod config;
pub mod metrics;

pub use config::{ConfigError, MetricsConfig};
pub use metrics::{
    BatchCallbackResult, FilterResults, Metric, MetricAggregate, MetricDao, MetricFilter,
    MetricKey, MetricsError, MetricsResult, SqliteMetricDao,
};
