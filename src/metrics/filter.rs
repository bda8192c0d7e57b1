//! The metric filter: a declarative criteria object.
//!
//! A [`MetricFilter`] only describes what to match. The statement builder
//! turns it into SQL; the DAO runs that SQL. Validation lives here so both
//! read and delete paths reject malformed combinations the same way.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::aggregate::{MetricAggregate, ensure_unique_keys};
use super::types::{MetricsError, MetricsResult};

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// A metric field that results can be ordered by.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Timestamp,
    Type,
    Name,
    Value,
}

impl SortField {
    pub fn key(self) -> &'static str {
        match self {
            Self::Timestamp => "ts",
            Self::Type => "type",
            Self::Name => "name",
            Self::Value => "value",
        }
    }
}

impl std::fmt::Display for SortField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SortField {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ts" | "timestamp" | "date" => Ok(Self::Timestamp),
            "type" => Ok(Self::Type),
            "name" => Ok(Self::Name),
            "value" | "val" => Ok(Self::Value),
            other => Err(MetricsError::InvalidFilter(format!(
                "unknown sort field '{other}'"
            ))),
        }
    }
}

/// One ORDER BY term: a field and a direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SortDescriptor {
    pub field: SortField,
    pub descending: bool,
}

impl SortDescriptor {
    pub const fn asc(field: SortField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub const fn desc(field: SortField) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

impl FromStr for SortDescriptor {
    type Err = MetricsError;

    /// Parse `field` or `field:asc` / `field:desc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, dir) = match s.split_once(':') {
            Some((field, dir)) => (field, Some(dir)),
            None => (s, None),
        };
        let field: SortField = field.parse()?;
        match dir.map(|d| d.trim().to_ascii_lowercase()) {
            None => Ok(Self::asc(field)),
            Some(d) if d == "asc" => Ok(Self::asc(field)),
            Some(d) if d == "desc" => Ok(Self::desc(field)),
            Some(d) => Err(MetricsError::InvalidFilter(format!(
                "unknown sort direction '{d}'"
            ))),
        }
    }
}

/// Sort by type, then name.
pub const SORT_BY_TYPE_NAME: [SortDescriptor; 2] = [
    SortDescriptor::asc(SortField::Type),
    SortDescriptor::asc(SortField::Name),
];

// ---------------------------------------------------------------------------
// MetricFilter
// ---------------------------------------------------------------------------

/// Criteria for finding, aggregating or deleting metrics.
///
/// Criteria in different categories are AND'd; values inside `types` or
/// `names` are OR'd. The singular `metric_type` / `name` fields are sugar for
/// one-element sets and may not be combined with their plural counterpart.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricFilter {
    /// Inclusive lower bound on the timestamp.
    pub start_date: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the timestamp.
    pub end_date: Option<DateTime<Utc>>,
    /// Exact type match.
    pub metric_type: Option<String>,
    /// Type allow-list (empty = all types).
    pub types: Vec<String>,
    /// Exact name match.
    pub name: Option<String>,
    /// Name allow-list (empty = all names).
    pub names: Vec<String>,
    /// Non-empty switches the query into aggregation mode.
    pub aggregates: Vec<MetricAggregate>,
    /// ORDER BY terms, left-to-right precedence.
    pub sorts: Vec<SortDescriptor>,
    /// Zero-based number of result rows to skip.
    pub offset: Option<u64>,
    /// Maximum number of result rows to return.
    pub max: Option<u64>,
    /// Only the newest row for each type and name.
    pub most_recent: bool,
    /// Also compute the total number of matching rows.
    pub with_total_results_count: bool,
}

impl MetricFilter {
    pub fn has_date_criteria(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }

    pub fn has_type_criteria(&self) -> bool {
        self.metric_type.is_some() || !self.types.is_empty()
    }

    pub fn has_name_criteria(&self) -> bool {
        self.name.is_some() || !self.names.is_empty()
    }

    pub fn is_aggregate(&self) -> bool {
        !self.aggregates.is_empty()
    }

    pub fn is_paginated(&self) -> bool {
        self.offset.is_some() || self.max.is_some()
    }

    /// The type inclusion set, singular or plural, in caller order.
    pub fn type_criteria(&self) -> Vec<&str> {
        selector_values(self.metric_type.as_deref(), &self.types)
    }

    /// The name inclusion set, singular or plural, in caller order.
    pub fn name_criteria(&self) -> Vec<&str> {
        selector_values(self.name.as_deref(), &self.names)
    }

    /// Check the filter can drive a find query.
    pub fn validate_for_query(&self) -> MetricsResult<()> {
        self.validate_selectors()?;
        if self.is_aggregate() {
            ensure_unique_keys(&self.aggregates)?;
            if self.most_recent {
                return Err(MetricsError::InvalidFilter(
                    "most-recent mode cannot be combined with aggregates".into(),
                ));
            }
        }
        Ok(())
    }

    /// Check the filter can drive a delete. Only raw-row criteria are
    /// meaningful; sorts are ignored.
    pub fn validate_for_delete(&self) -> MetricsResult<()> {
        self.validate_selectors()?;
        if self.is_aggregate() {
            return Err(MetricsError::InvalidFilter(
                "aggregates cannot be used to delete metrics".into(),
            ));
        }
        if self.is_paginated() {
            return Err(MetricsError::InvalidFilter(
                "offset and max cannot be used to delete metrics".into(),
            ));
        }
        if self.most_recent {
            return Err(MetricsError::InvalidFilter(
                "most-recent mode cannot be used to delete metrics".into(),
            ));
        }
        Ok(())
    }

    fn validate_selectors(&self) -> MetricsResult<()> {
        if self.metric_type.is_some() && !self.types.is_empty() {
            return Err(MetricsError::InvalidFilter(
                "type and types cannot both be set".into(),
            ));
        }
        if self.name.is_some() && !self.names.is_empty() {
            return Err(MetricsError::InvalidFilter(
                "name and names cannot both be set".into(),
            ));
        }
        Ok(())
    }
}

fn selector_values<'a>(single: Option<&'a str>, many: &'a [String]) -> Vec<&'a str> {
    match single {
        Some(v) => vec![v],
        None => many.iter().map(String::as_str).collect(),
    }
}
