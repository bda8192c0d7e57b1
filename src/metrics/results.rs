//! Filtered query results.

use serde::Serialize;

use super::types::{Metric, MetricKey};

/// Something with a stable identity.
pub trait Identity {
    type Id;

    fn id(&self) -> Self::Id;
}

impl Identity for Metric {
    type Id = MetricKey;

    fn id(&self) -> MetricKey {
        self.key().clone()
    }
}

/// A possibly paginated page of results from a filtered query.
///
/// One-shot: iterating consumes the page and there is no way to restart it.
/// The page metadata can be read before that. The total count is only present
/// when the filter asked for it.
///
/// ```compile_fail
/// # use node_metrics::metrics::{FilterResults, Metric};
/// let results: FilterResults<Metric> = FilterResults::new(Vec::new(), None, 0);
/// for _ in results {}
/// for _ in results {}
/// ```
#[derive(Debug, PartialEq, Serialize)]
pub struct FilterResults<T> {
    results: Vec<T>,
    total_results: Option<u64>,
    starting_offset: u64,
}

impl<T> FilterResults<T> {
    pub fn new(results: Vec<T>, total_results: Option<u64>, starting_offset: u64) -> Self {
        Self {
            results,
            total_results,
            starting_offset,
        }
    }

    /// Total rows matching the filter ignoring pagination, if computed.
    pub fn total_results(&self) -> Option<u64> {
        self.total_results
    }

    /// Zero-based offset of the first returned row.
    pub fn starting_offset(&self) -> u64 {
        self.starting_offset
    }

    /// Number of rows in this page.
    pub fn returned_result_count(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl<T: Identity> FilterResults<T> {
    /// Identities of the returned rows, in result order.
    pub fn ids(&self) -> Vec<T::Id> {
        self.results.iter().map(Identity::id).collect()
    }
}

impl<T> IntoIterator for FilterResults<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
