//! Running counters for the metric DAO.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Default number of increments between statistic log lines.
pub const DEFAULT_STAT_LOG_FREQUENCY: u64 = 100;

/// A tracked DAO statistic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDaoStat {
    MetricsStored,
    MetricsDeleted,
}

impl std::fmt::Display for MetricDaoStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MetricsStored => write!(f, "metrics_stored"),
            Self::MetricsDeleted => write!(f, "metrics_deleted"),
        }
    }
}

/// Lock-free stored/deleted counters that log every `log_frequency`
/// increments.
#[derive(Debug)]
pub struct MetricDaoStats {
    stored: AtomicU64,
    deleted: AtomicU64,
    log_frequency: AtomicU64,
}

impl Default for MetricDaoStats {
    fn default() -> Self {
        Self::new(DEFAULT_STAT_LOG_FREQUENCY)
    }
}

impl MetricDaoStats {
    pub fn new(log_frequency: u64) -> Self {
        Self {
            stored: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            log_frequency: AtomicU64::new(log_frequency),
        }
    }

    pub fn get(&self, stat: MetricDaoStat) -> u64 {
        self.counter(stat).load(Ordering::Relaxed)
    }

    /// Add to a counter, returning the new value.
    pub fn add(&self, stat: MetricDaoStat, count: u64) -> u64 {
        if count == 0 {
            return self.get(stat);
        }
        let before = self.counter(stat).fetch_add(count, Ordering::Relaxed);
        let after = before + count;
        let freq = self.log_frequency();
        // 0 disables logging
        if freq > 0 && before / freq != after / freq {
            tracing::info!(
                stat = %stat,
                value = after,
                stored = self.get(MetricDaoStat::MetricsStored),
                deleted = self.get(MetricDaoStat::MetricsDeleted),
                "metric dao statistics"
            );
        }
        after
    }

    pub fn increment(&self, stat: MetricDaoStat) -> u64 {
        self.add(stat, 1)
    }

    pub fn log_frequency(&self) -> u64 {
        self.log_frequency.load(Ordering::Relaxed)
    }

    pub fn set_log_frequency(&self, frequency: u64) {
        self.log_frequency.store(frequency, Ordering::Relaxed);
    }

    fn counter(&self, stat: MetricDaoStat) -> &AtomicU64 {
        match stat {
            MetricDaoStat::MetricsStored => &self.stored,
            MetricDaoStat::MetricsDeleted => &self.deleted,
        }
    }
}
