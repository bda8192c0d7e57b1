//! Fuzz target for the filter to SQL statement builder.
//!
//! Builds statements from arbitrary filters and checks that accepted
//! filters produce SQL whose placeholders agree with the binds and that
//! SQLite can actually execute.

#![no_main]

use std::sync::OnceLock;

use arbitrary::Arbitrary;
use chrono::{DateTime, Utc};
use libfuzzer_sys::fuzz_target;

use node_metrics::metrics::statement::{count_statement, delete_statement, select_statement};
use node_metrics::metrics::{
    Metric, MetricAggregate, MetricDao, MetricFilter, MetricsError, SortDescriptor, SortField,
    SqliteMetricDao,
};

#[derive(Arbitrary, Debug)]
struct FilterInput {
    start_secs: Option<i32>,
    end_secs: Option<i32>,
    metric_type: Option<String>,
    types: Vec<String>,
    name: Option<String>,
    names: Vec<String>,
    /// Indexes into the basic aggregates, or quantile percents when >= 5.
    aggregates: Vec<u8>,
    sorts: Vec<(u8, bool)>,
    offset: Option<u64>,
    max: Option<u64>,
    most_recent: bool,
    with_total_results_count: bool,
}

fn to_date(secs: Option<i32>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(i64::from(s), 0))
}

fn to_aggregate(code: u8) -> Option<MetricAggregate> {
    match code {
        0 => Some(MetricAggregate::MINIMUM),
        1 => Some(MetricAggregate::MAXIMUM),
        2 => Some(MetricAggregate::AVERAGE),
        3 => Some(MetricAggregate::COUNT),
        4 => Some(MetricAggregate::SUM),
        n => MetricAggregate::quantile(f64::from(n - 5) / 100.0).ok(),
    }
}

fn to_sort((field, descending): (u8, bool)) -> SortDescriptor {
    let field = match field % 4 {
        0 => SortField::Timestamp,
        1 => SortField::Type,
        2 => SortField::Name,
        _ => SortField::Value,
    };
    SortDescriptor { field, descending }
}

fn dao() -> &'static SqliteMetricDao {
    static DAO: OnceLock<SqliteMetricDao> = OnceLock::new();
    DAO.get_or_init(|| {
        let dao = SqliteMetricDao::open_in_memory().expect("open dao");
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            if let Some(ts) = DateTime::from_timestamp(i as i64, 0) {
                let _ = dao.save(&Metric::sample(ts, *name, i as f64));
            }
        }
        dao
    })
}

fuzz_target!(|input: FilterInput| {
    let filter = MetricFilter {
        start_date: to_date(input.start_secs),
        end_date: to_date(input.end_secs),
        metric_type: input.metric_type,
        types: input.types,
        name: input.name,
        names: input.names,
        aggregates: input.aggregates.into_iter().filter_map(to_aggregate).collect(),
        sorts: input.sorts.into_iter().map(to_sort).collect(),
        offset: input.offset,
        max: input.max,
        most_recent: input.most_recent,
        with_total_results_count: input.with_total_results_count,
    };

    let Ok(stmt) = select_statement(&filter) else {
        return;
    };
    assert_eq!(stmt.max_placeholder_index(), stmt.binds.len());
    let count = count_statement(&filter).expect("count accepts what select accepts");
    assert_eq!(count.max_placeholder_index(), count.binds.len());

    match dao().find_filtered(&filter) {
        Ok(_) => {}
        Err(MetricsError::Storage(err)) => panic!("generated invalid SQL: {err}\n{}", stmt.sql),
        Err(_) => {}
    }

    if let Ok(delete) = delete_statement(&filter) {
        assert_eq!(delete.max_placeholder_index(), delete.binds.len());
    }
});
