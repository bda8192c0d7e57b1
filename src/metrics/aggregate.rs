//! Aggregate descriptors for summarizing metric groups.
//!
//! Every aggregate has a stable [`key`](MetricAggregate::key) that tags the
//! output rows it produces. A list of aggregates is consumed in two distinct
//! orders, and the two must never be mixed up:
//!
//! - [`declaration_order_parameters`]: the bound numeric parameters of the
//!   parameterized aggregates, in the order the caller listed them. This is
//!   the order the parameters appear in the generated statement.
//! - [`key_order`]: the aggregates sorted by ascending key. This is the order
//!   result rows are emitted in for each metric name.

use std::str::FromStr;

use super::types::{MetricsError, MetricsResult};

// ---------------------------------------------------------------------------
// Basic aggregates
// ---------------------------------------------------------------------------

/// Key of the minimum aggregate.
pub const METRIC_TYPE_MINIMUM: &str = "min";
/// Key of the maximum aggregate.
pub const METRIC_TYPE_MAXIMUM: &str = "max";
/// Key of the average aggregate.
pub const METRIC_TYPE_AVERAGE: &str = "avg";
/// Key of the count aggregate.
pub const METRIC_TYPE_COUNT: &str = "cnt";
/// Key of the sum aggregate.
pub const METRIC_TYPE_SUM: &str = "sum";
/// Key prefix of quantile aggregates, followed by the integer percent.
pub const METRIC_TYPE_QUANTILE_PREFIX: &str = "q:";

/// Parameterless aggregates backed by a built-in SQL aggregate function.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BasicAggregate {
    Minimum,
    Maximum,
    Average,
    Count,
    Sum,
}

impl BasicAggregate {
    pub const ALL: [BasicAggregate; 5] = [
        Self::Minimum,
        Self::Maximum,
        Self::Average,
        Self::Count,
        Self::Sum,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Minimum => METRIC_TYPE_MINIMUM,
            Self::Maximum => METRIC_TYPE_MAXIMUM,
            Self::Average => METRIC_TYPE_AVERAGE,
            Self::Count => METRIC_TYPE_COUNT,
            Self::Sum => METRIC_TYPE_SUM,
        }
    }

    /// The SQL aggregate function computing this value.
    pub fn sql_function(self) -> &'static str {
        match self {
            Self::Minimum => "MIN",
            Self::Maximum => "MAX",
            Self::Average => "AVG",
            Self::Count => "COUNT",
            Self::Sum => "SUM",
        }
    }
}

// ---------------------------------------------------------------------------
// Quantiles
// ---------------------------------------------------------------------------

/// A continuous-interpolation quantile with its bound fraction in `[0, 1]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Quantile {
    fraction: f64,
}

impl Quantile {
    /// Create a quantile for a fraction in `[0, 1]`, e.g. `0.25`.
    pub fn new(fraction: f64) -> MetricsResult<Self> {
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return Err(MetricsError::InvalidAggregate(format!(
                "quantile fraction {fraction} is outside [0, 1]"
            )));
        }
        Ok(Self { fraction })
    }

    /// Create a quantile from a percent in `[0, 100]`, e.g. `25.0`.
    pub fn from_percent(percent: f64) -> MetricsResult<Self> {
        Self::new(percent / 100.0)
    }

    pub fn fraction(self) -> f64 {
        self.fraction
    }

    /// `q:` followed by the percent, as an integer when it is whole.
    pub fn key(self) -> String {
        let percent = self.fraction * 100.0;
        let rounded = percent.round();
        if (percent - rounded).abs() < 1e-9 {
            format!("{METRIC_TYPE_QUANTILE_PREFIX}{}", rounded as i64)
        } else {
            let text = format!("{percent:.6}");
            let text = text.trim_end_matches('0').trim_end_matches('.');
            format!("{METRIC_TYPE_QUANTILE_PREFIX}{text}")
        }
    }
}

// ---------------------------------------------------------------------------
// MetricAggregate
// ---------------------------------------------------------------------------

/// A named summarization function applied across metrics sharing a name.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricAggregate {
    Basic(BasicAggregate),
    Quantile(Quantile),
}

impl MetricAggregate {
    pub const MINIMUM: MetricAggregate = MetricAggregate::Basic(BasicAggregate::Minimum);
    pub const MAXIMUM: MetricAggregate = MetricAggregate::Basic(BasicAggregate::Maximum);
    pub const AVERAGE: MetricAggregate = MetricAggregate::Basic(BasicAggregate::Average);
    pub const COUNT: MetricAggregate = MetricAggregate::Basic(BasicAggregate::Count);
    pub const SUM: MetricAggregate = MetricAggregate::Basic(BasicAggregate::Sum);
    pub const QUANTILE_25: MetricAggregate =
        MetricAggregate::Quantile(Quantile { fraction: 0.25 });
    pub const QUANTILE_75: MetricAggregate =
        MetricAggregate::Quantile(Quantile { fraction: 0.75 });

    /// Quantile aggregate for a fraction in `[0, 1]`.
    pub fn quantile(fraction: f64) -> MetricsResult<Self> {
        Quantile::new(fraction).map(Self::Quantile)
    }

    /// Stable key tagging output rows, also the output ordering key.
    pub fn key(&self) -> String {
        match self {
            Self::Basic(b) => b.key().to_string(),
            Self::Quantile(q) => q.key(),
        }
    }

    /// The numeric parameter bound into the statement, if any.
    pub fn parameter(&self) -> Option<f64> {
        match self {
            Self::Basic(_) => None,
            Self::Quantile(q) => Some(q.fraction()),
        }
    }

    pub fn is_parameterized(&self) -> bool {
        self.parameter().is_some()
    }
}

impl std::fmt::Display for MetricAggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for MetricAggregate {
    type Err = MetricsError;

    /// Parse an aggregate key, case-insensitively: `min`, `max`, `avg`,
    /// `cnt`, `sum`, or `q:NN` where `NN` is a percent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        if let Some(b) = BasicAggregate::ALL.iter().find(|b| b.key() == key) {
            return Ok(Self::Basic(*b));
        }
        if let Some(percent) = key.strip_prefix(METRIC_TYPE_QUANTILE_PREFIX) {
            let percent: f64 = percent.parse().map_err(|_| {
                MetricsError::InvalidAggregate(format!("invalid quantile percent in '{s}'"))
            })?;
            return Quantile::from_percent(percent).map(Self::Quantile);
        }
        Err(MetricsError::InvalidAggregate(format!(
            "unknown aggregate '{s}'"
        )))
    }
}

// ---------------------------------------------------------------------------
// Orderings
// ---------------------------------------------------------------------------

/// Numeric parameters of the parameterized aggregates, in declaration order.
///
/// Governs bind order only; basic aggregates contribute nothing.
pub fn declaration_order_parameters(aggregates: &[MetricAggregate]) -> Vec<f64> {
    aggregates.iter().filter_map(MetricAggregate::parameter).collect()
}

/// Aggregates sorted by ascending key, paired with their declaration index.
///
/// Governs output row order only.
pub fn key_order(aggregates: &[MetricAggregate]) -> Vec<(usize, &MetricAggregate)> {
    let mut ordered: Vec<(usize, &MetricAggregate)> = aggregates.iter().enumerate().collect();
    ordered.sort_by_cached_key(|(_, agg)| agg.key());
    ordered
}

/// Reject lists where two aggregates share a key; their rows would be
/// indistinguishable.
pub fn ensure_unique_keys(aggregates: &[MetricAggregate]) -> MetricsResult<()> {
    let mut seen: Vec<String> = Vec::with_capacity(aggregates.len());
    for agg in aggregates {
        let key = agg.key();
        if seen.contains(&key) {
            return Err(MetricsError::InvalidFilter(format!(
                "aggregate '{key}' requested more than once"
            )));
        }
        seen.push(key);
    }
    Ok(())
}
