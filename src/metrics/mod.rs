//! Metric storage, filtering and aggregation.
//!
//! Module layout:
//! - [`types`]: `Metric`, `MetricKey` and the error type.
//! - [`aggregate`]: aggregate descriptors and their two orderings.
//! - [`filter`]: `MetricFilter` and sort descriptors.
//! - [`statement`]: pure filter to SQL translation.
//! - [`dao`]: SQLite execution of the built statements.
//! - [`results`] / [`stats`]: query pages and running counters.

pub mod aggregate;
pub mod dao;
pub mod filter;
pub mod results;
pub mod statement;
pub mod stats;
pub mod types;

pub use aggregate::{BasicAggregate, MetricAggregate, Quantile};
pub use dao::{BatchCallbackResult, DaoStatus, MetricDao, SqliteMetricDao};
pub use filter::{MetricFilter, SORT_BY_TYPE_NAME, SortDescriptor, SortField};
pub use results::{FilterResults, Identity};
pub use statement::{BindValue, Statement};
pub use stats::{MetricDaoStat, MetricDaoStats};
pub use types::{METRIC_TYPE_SAMPLE, Metric, MetricKey, MetricsError, MetricsResult};
