//! Core value types for stored metrics.
//!
//! A [`Metric`] is one timestamped sample; its identity is the
//! [`MetricKey`] triple `(timestamp, type, name)`. Both are immutable once
//! built: samples are facts, and the store never updates them in place.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised by the metric store and its query builder.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// A metric with the same `(timestamp, type, name)` is already stored.
    #[error("metric already exists: {0}")]
    DuplicateKey(MetricKey),

    /// The filter combines criteria that have no well-defined meaning.
    #[error("invalid metric filter: {0}")]
    InvalidFilter(String),

    /// An aggregate descriptor could not be built or parsed.
    #[error("invalid metric aggregate: {0}")]
    InvalidAggregate(String),

    /// The on-disk table was created by an incompatible version.
    #[error("metric table version {found} is not supported (expected {expected})")]
    SchemaVersion { found: i64, expected: i64 },

    /// Any other storage failure, passed through unmodified.
    #[error("metric storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Convenience alias.
pub type MetricsResult<T> = std::result::Result<T, MetricsError>;

// ---------------------------------------------------------------------------
// Well-known metric types
// ---------------------------------------------------------------------------

/// Metric type used for raw captured samples.
pub const METRIC_TYPE_SAMPLE: &str = "s";

// ---------------------------------------------------------------------------
// MetricKey
// ---------------------------------------------------------------------------

/// The composite primary key of a stored metric.
///
/// Ordering is by timestamp, then type, then name, which is also the default
/// ordering of raw query results.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MetricKey {
    timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    metric_type: String,
    name: String,
}

impl MetricKey {
    /// Create a key. The timestamp is truncated to millisecond precision, the
    /// resolution the store persists.
    pub fn new(
        timestamp: DateTime<Utc>,
        metric_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: truncate_to_millis(timestamp),
            metric_type: metric_type.into(),
            name: name.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metric_type(&self) -> &str {
        &self.metric_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}/{}",
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            self.metric_type,
            self.name
        )
    }
}

// ---------------------------------------------------------------------------
// Metric
// ---------------------------------------------------------------------------

/// A single timestamped numeric sample tagged by type and name.
///
/// In aggregation results the `type` carries the aggregate key (for example
/// `avg` or `q:25`) and `value` the computed aggregate.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Metric {
    #[serde(flatten)]
    key: MetricKey,
    value: f64,
}

impl Metric {
    pub fn new(
        timestamp: DateTime<Utc>,
        metric_type: impl Into<String>,
        name: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            key: MetricKey::new(timestamp, metric_type, name),
            value,
        }
    }

    /// Create a raw sample metric of type [`METRIC_TYPE_SAMPLE`].
    pub fn sample(timestamp: DateTime<Utc>, name: impl Into<String>, value: f64) -> Self {
        Self::new(timestamp, METRIC_TYPE_SAMPLE, name, value)
    }

    /// Create a metric for an existing key.
    pub fn with_key(key: MetricKey, value: f64) -> Self {
        Self { key, value }
    }

    pub fn key(&self) -> &MetricKey {
        &self.key
    }

    pub fn into_key(self) -> MetricKey {
        self.key
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.key.timestamp
    }

    pub fn metric_type(&self) -> &str {
        &self.key.metric_type
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

// ---------------------------------------------------------------------------
// Timestamp helpers
// ---------------------------------------------------------------------------

/// Epoch milliseconds, the persisted timestamp representation.
pub fn to_epoch_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Epoch milliseconds rounded up, so a bound with sub-millisecond precision
/// still excludes the stored millisecond it lies after.
pub fn to_epoch_millis_ceil(ts: DateTime<Utc>) -> i64 {
    let ms = ts.timestamp_millis();
    if ts.timestamp_subsec_nanos() % 1_000_000 == 0 {
        ms
    } else {
        ms.saturating_add(1)
    }
}

/// Inverse of [`to_epoch_millis`]; `None` when out of chrono's range.
pub fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    from_epoch_millis(ts.timestamp_millis()).unwrap_or(ts)
}
