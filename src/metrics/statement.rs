//! SQL statement builders for metric queries.
//!
//! Every function here is a pure translation of a [`MetricFilter`] into a
//! [`Statement`]: SQL text plus an ordered list of bind values. Nothing here
//! touches a connection, so identical filters always produce byte-identical
//! statements. Placeholders are numbered (`?1`, `?2`, ...) in the order values
//! are pushed, and criteria are always checked in this fixed order:
//!
//! 1. parameterized aggregate fractions, in declaration order (aggregate mode)
//! 2. start date
//! 3. end date
//! 4. type selector(s)
//! 5. name selector(s)
//! 6. offset
//! 7. max
//!
//! Absent criteria produce neither SQL nor a bind. In raw mode each selector
//! value gets its own placeholder; in aggregate mode each selector category
//! binds as one array value read through `rarray()`.
//!
//! All statements project the same four columns, `(ts, mtype, mname, val)`,
//! so one row mapper serves raw, most-recent and aggregate results.

use super::aggregate::{MetricAggregate, key_order};
use super::filter::{MetricFilter, SortDescriptor, SortField};
use super::types::{
    Metric, MetricKey, MetricsError, MetricsResult, to_epoch_millis, to_epoch_millis_ceil,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Name of the metric table.
pub const TABLE_NAME: &str = "mtr_metric";

/// Rows stepped per fetch when streaming results.
pub const FETCH_SIZE: usize = 1000;

/// SQL name of the continuous percentile aggregate registered on each
/// connection.
pub const PERCENTILE_FUNCTION: &str = "percentile_cont";

/// Column order of every metric projection.
pub const METRIC_COLUMNS: &str = "ts, mtype, mname, val";

// ---------------------------------------------------------------------------
// Statement types
// ---------------------------------------------------------------------------

/// A single bind parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Integer(i64),
    Real(f64),
    Text(String),
    /// A multi-valued inclusion set bound as one array parameter.
    TextArray(Vec<String>),
}

/// Generated SQL with its ordered bind values.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<BindValue>,
    /// Streaming hint for the executor.
    pub fetch_size: usize,
}

impl Statement {
    fn new(sql: String, binds: Binds) -> Self {
        Self {
            sql,
            binds: binds.values,
            fetch_size: FETCH_SIZE,
        }
    }

    /// Highest `?N` placeholder index in the SQL text (0 when none).
    pub fn max_placeholder_index(&self) -> usize {
        let bytes = self.sql.as_bytes();
        let mut max = 0;
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'?' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if let Ok(n) = self.sql[start..end].parse::<usize>() {
                    max = max.max(n);
                }
                i = end;
            } else {
                i += 1;
            }
        }
        max
    }
}

/// Bind accumulator handing out numbered placeholders.
#[derive(Default)]
struct Binds {
    values: Vec<BindValue>,
}

impl Binds {
    fn push(&mut self, value: BindValue) -> String {
        self.values.push(value);
        format!("?{}", self.values.len())
    }
}

// ---------------------------------------------------------------------------
// Public builders
// ---------------------------------------------------------------------------

/// Build the find query for a filter: raw, most-recent or aggregate,
/// with ordering and pagination.
pub fn select_statement(filter: &MetricFilter) -> MetricsResult<Statement> {
    filter.validate_for_query()?;
    let mut binds = Binds::default();
    let mut sql = select_body(filter, &mut binds);
    sql.push_str(&order_by_clause(filter));
    push_pagination(filter, &mut binds, &mut sql)?;
    tracing::trace!(sql = %sql, binds = binds.values.len(), "built select statement");
    Ok(Statement::new(sql, binds))
}

/// Build a statement counting every row the find query would return when
/// unpaginated.
pub fn count_statement(filter: &MetricFilter) -> MetricsResult<Statement> {
    filter.validate_for_query()?;
    let mut binds = Binds::default();
    let body = select_body(filter, &mut binds);
    Ok(Statement::new(
        format!("SELECT COUNT(*) FROM ({body}) AS c"),
        binds,
    ))
}

/// Build the delete statement for a filter's raw-row criteria.
pub fn delete_statement(filter: &MetricFilter) -> MetricsResult<Statement> {
    filter.validate_for_delete()?;
    let mut binds = Binds::default();
    let parts = raw_where_parts(filter, &mut binds);
    let sql = format!("DELETE FROM {TABLE_NAME}{}", where_clause(&parts));
    tracing::trace!(sql = %sql, binds = binds.values.len(), "built delete statement");
    Ok(Statement::new(sql, binds))
}

/// Build the single-row lookup by primary key.
pub fn get_statement(key: &MetricKey) -> Statement {
    let mut binds = Binds::default();
    let ts = binds.push(BindValue::Integer(to_epoch_millis(key.timestamp())));
    let mtype = binds.push(BindValue::Text(key.metric_type().to_string()));
    let mname = binds.push(BindValue::Text(key.name().to_string()));
    Statement::new(
        format!(
            "SELECT {METRIC_COLUMNS} FROM {TABLE_NAME} WHERE ts = {ts} AND mtype = {mtype} AND mname = {mname}"
        ),
        binds,
    )
}

/// Build the insert for one metric. Plain INSERT: an existing key fails
/// with a constraint violation instead of being replaced.
pub fn insert_statement(metric: &Metric) -> Statement {
    let mut binds = Binds::default();
    let ts = binds.push(BindValue::Integer(to_epoch_millis(metric.timestamp())));
    let mtype = binds.push(BindValue::Text(metric.metric_type().to_string()));
    let mname = binds.push(BindValue::Text(metric.name().to_string()));
    let val = binds.push(BindValue::Real(metric.value()));
    Statement::new(
        format!("INSERT INTO {TABLE_NAME} ({METRIC_COLUMNS}) VALUES ({ts}, {mtype}, {mname}, {val})"),
        binds,
    )
}

// ---------------------------------------------------------------------------
// Query bodies
// ---------------------------------------------------------------------------

fn select_body(filter: &MetricFilter, binds: &mut Binds) -> String {
    if filter.is_aggregate() {
        aggregate_body(filter, binds)
    } else if filter.most_recent {
        let parts = raw_where_parts(filter, binds);
        format!(
            "SELECT {METRIC_COLUMNS} FROM (SELECT {METRIC_COLUMNS}, \
             ROW_NUMBER() OVER (PARTITION BY mtype, mname ORDER BY ts DESC) AS rn \
             FROM {TABLE_NAME}{}) AS r WHERE rn = 1",
            where_clause(&parts)
        )
    } else {
        let parts = raw_where_parts(filter, binds);
        format!(
            "SELECT {METRIC_COLUMNS} FROM {TABLE_NAME}{}",
            where_clause(&parts)
        )
    }
}

/// Grouped projection: one inner row per name carrying every aggregate in
/// declaration order (`a0`, `a1`, ...), cross joined with the aggregate keys
/// in key order to yield one output row per `(name, aggregate)`.
///
/// The timestamp of each output row is the earliest sample timestamp in the
/// name's group.
fn aggregate_body(filter: &MetricFilter, binds: &mut Binds) -> String {
    let aggregates = &filter.aggregates;

    // Declaration order: the projection lists aggregates as declared, so the
    // parameterized ones bind their fractions first and in caller order.
    let mut projections = Vec::with_capacity(aggregates.len());
    for (idx, agg) in aggregates.iter().enumerate() {
        let expr = match agg {
            MetricAggregate::Basic(basic) => format!("{}(val)", basic.sql_function()),
            MetricAggregate::Quantile(q) => {
                let p = binds.push(BindValue::Real(q.fraction()));
                format!("{PERCENTILE_FUNCTION}(val, {p})")
            }
        };
        projections.push(format!("{expr} AS a{idx}"));
    }

    let parts = aggregate_where_parts(filter, binds);

    // Key order: the key table and CASE arms follow ascending key.
    let ordered = key_order(aggregates);
    let key_rows = ordered
        .iter()
        .map(|(_, agg)| format!("SELECT {} AS akey", sql_literal(&agg.key())))
        .collect::<Vec<_>>()
        .join(" UNION ALL ");
    let case_arms = ordered
        .iter()
        .map(|(idx, agg)| format!("WHEN {} THEN g.a{idx}", sql_literal(&agg.key())))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "SELECT g.ts AS ts, a.akey AS mtype, g.mname AS mname, \
         CASE a.akey {case_arms} END AS val \
         FROM (SELECT mname, MIN(ts) AS ts, {projections} FROM {TABLE_NAME}{where_sql} GROUP BY mname) AS g \
         CROSS JOIN ({key_rows}) AS a",
        projections = projections.join(", "),
        where_sql = where_clause(&parts),
    )
}

// ---------------------------------------------------------------------------
// WHERE clauses
// ---------------------------------------------------------------------------

fn raw_where_parts(filter: &MetricFilter, binds: &mut Binds) -> Vec<String> {
    let mut parts = date_where_parts(filter, binds);
    if let Some(part) = selector_part("mtype", &filter.type_criteria(), binds) {
        parts.push(part);
    }
    if let Some(part) = selector_part("mname", &filter.name_criteria(), binds) {
        parts.push(part);
    }
    parts
}

fn aggregate_where_parts(filter: &MetricFilter, binds: &mut Binds) -> Vec<String> {
    let mut parts = date_where_parts(filter, binds);
    if let Some(part) = array_selector_part("mtype", &filter.type_criteria(), binds) {
        parts.push(part);
    }
    if let Some(part) = array_selector_part("mname", &filter.name_criteria(), binds) {
        parts.push(part);
    }
    parts
}

fn date_where_parts(filter: &MetricFilter, binds: &mut Binds) -> Vec<String> {
    let mut parts = Vec::new();
    // Stored timestamps are whole milliseconds; rounding both bounds up keeps
    // `[start, end)` exact when a bound carries finer precision.
    if let Some(start) = filter.start_date {
        let p = binds.push(BindValue::Integer(to_epoch_millis_ceil(start)));
        parts.push(format!("ts >= {p}"));
    }
    if let Some(end) = filter.end_date {
        let p = binds.push(BindValue::Integer(to_epoch_millis_ceil(end)));
        parts.push(format!("ts < {p}"));
    }
    parts
}

fn selector_part(column: &str, values: &[&str], binds: &mut Binds) -> Option<String> {
    match values {
        [] => None,
        [single] => {
            let p = binds.push(BindValue::Text((*single).to_string()));
            Some(format!("{column} = {p}"))
        }
        many => {
            let placeholders: Vec<String> = many
                .iter()
                .map(|v| binds.push(BindValue::Text((*v).to_string())))
                .collect();
            Some(format!("{column} IN ({})", placeholders.join(", ")))
        }
    }
}

fn array_selector_part(column: &str, values: &[&str], binds: &mut Binds) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let p = binds.push(BindValue::TextArray(
        values.iter().map(|v| (*v).to_string()).collect(),
    ));
    Some(format!("{column} IN rarray({p})"))
}

fn where_clause(parts: &[String]) -> String {
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

// ---------------------------------------------------------------------------
// ORDER BY and pagination
// ---------------------------------------------------------------------------

/// Caller sorts first, then any key columns not yet named as ascending
/// tie-breakers, so the ordering is total and pages never overlap.
fn order_by_clause(filter: &MetricFilter) -> String {
    let (tail, column): (&[SortField], fn(SortField) -> &'static str) = if filter.is_aggregate()
    {
        (&[SortField::Name, SortField::Type], aggregate_sort_column)
    } else {
        (
            &[SortField::Timestamp, SortField::Type, SortField::Name],
            raw_sort_column,
        )
    };

    let mut seen: Vec<SortField> = Vec::with_capacity(filter.sorts.len() + tail.len());
    let mut terms = Vec::with_capacity(filter.sorts.len() + tail.len());
    let tail_sorts = tail.iter().map(|f| SortDescriptor::asc(*f));
    for sort in filter.sorts.iter().copied().chain(tail_sorts) {
        if seen.contains(&sort.field) {
            continue;
        }
        seen.push(sort.field);
        let col = column(sort.field);
        terms.push(if sort.descending {
            format!("{col} DESC")
        } else {
            col.to_string()
        });
    }
    format!(" ORDER BY {}", terms.join(", "))
}

fn raw_sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Timestamp => "ts",
        SortField::Type => "mtype",
        SortField::Name => "mname",
        SortField::Value => "val",
    }
}

fn aggregate_sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Timestamp => "g.ts",
        SortField::Type => "a.akey",
        SortField::Name => "g.mname",
        SortField::Value => "val",
    }
}

fn push_pagination(filter: &MetricFilter, binds: &mut Binds, sql: &mut String) -> MetricsResult<()> {
    let offset = filter.offset.map(|v| to_sql_count(v, "offset")).transpose()?;
    let max = filter.max.map(|v| to_sql_count(v, "max")).transpose()?;
    match (offset, max) {
        (None, None) => {}
        (Some(offset), None) => {
            let p = binds.push(BindValue::Integer(offset));
            sql.push_str(&format!(" LIMIT -1 OFFSET {p}"));
        }
        (None, Some(max)) => {
            let p = binds.push(BindValue::Integer(max));
            sql.push_str(&format!(" LIMIT {p}"));
        }
        (Some(offset), Some(max)) => {
            let offset_p = binds.push(BindValue::Integer(offset));
            let max_p = binds.push(BindValue::Integer(max));
            sql.push_str(&format!(" LIMIT {max_p} OFFSET {offset_p}"));
        }
    }
    Ok(())
}

fn to_sql_count(value: u64, what: &str) -> MetricsResult<i64> {
    i64::try_from(value)
        .map_err(|_| MetricsError::InvalidFilter(format!("{what} {value} is too large")))
}

fn sql_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::aggregate::declaration_order_parameters;
    use crate::metrics::filter::SORT_BY_TYPE_NAME;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_720_000_000 + secs, 0).unwrap()
    }

    fn ms(secs: i64) -> BindValue {
        BindValue::Integer((1_720_000_000 + secs) * 1000)
    }

    fn text(s: &str) -> BindValue {
        BindValue::Text(s.into())
    }

    #[test]
    fn empty_filter_selects_everything_in_key_order() {
        let stmt = select_statement(&MetricFilter::default()).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT ts, mtype, mname, val FROM mtr_metric ORDER BY ts, mtype, mname"
        );
        assert!(stmt.binds.is_empty());
        assert_eq!(stmt.fetch_size, FETCH_SIZE);
    }

    #[test]
    fn raw_bind_order_is_fixed() {
        let f = MetricFilter {
            names: vec!["a".into(), "c".into()],
            metric_type: Some("t1".into()),
            end_date: Some(ts(6)),
            start_date: Some(ts(2)),
            max: Some(5),
            offset: Some(10),
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT ts, mtype, mname, val FROM mtr_metric \
             WHERE ts >= ?1 AND ts < ?2 AND mtype = ?3 AND mname IN (?4, ?5) \
             ORDER BY ts, mtype, mname LIMIT ?7 OFFSET ?6"
        );
        assert_eq!(
            stmt.binds,
            vec![
                ms(2),
                ms(6),
                text("t1"),
                text("a"),
                text("c"),
                BindValue::Integer(10),
                BindValue::Integer(5),
            ]
        );
    }

    #[test]
    fn absent_criteria_bind_nothing() {
        let f = MetricFilter {
            end_date: Some(ts(3)),
            names: vec!["x".into()],
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert_eq!(stmt.binds, vec![ms(3), text("x")]);
        assert!(stmt.sql.contains("WHERE ts < ?1 AND mname = ?2"));
        assert!(!stmt.sql.contains("LIMIT"));
    }

    #[test]
    fn offset_only_and_max_only() {
        let f = MetricFilter {
            offset: Some(4),
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert!(stmt.sql.ends_with(" LIMIT -1 OFFSET ?1"));
        assert_eq!(stmt.binds, vec![BindValue::Integer(4)]);

        let f = MetricFilter {
            max: Some(2),
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert!(stmt.sql.ends_with(" LIMIT ?1"));
        assert_eq!(stmt.binds, vec![BindValue::Integer(2)]);
    }

    #[test]
    fn sorts_add_text_but_no_binds() {
        let f = MetricFilter {
            metric_type: Some("t".into()),
            sorts: vec![
                SortDescriptor::desc(SortField::Value),
                SortDescriptor::asc(SortField::Name),
            ],
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert!(stmt.sql.ends_with(" ORDER BY val DESC, mname, ts, mtype"));
        assert_eq!(stmt.binds, vec![text("t")]);
    }

    #[test]
    fn repeated_sort_field_is_listed_once() {
        let f = MetricFilter {
            sorts: vec![
                SortDescriptor::desc(SortField::Timestamp),
                SortDescriptor::asc(SortField::Timestamp),
            ],
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert!(stmt.sql.ends_with(" ORDER BY ts DESC, mtype, mname"));
    }

    #[test]
    fn aggregate_bind_order() {
        let f = MetricFilter {
            start_date: Some(ts(0)),
            end_date: Some(ts(3)),
            types: vec!["s".into(), "x".into()],
            aggregates: vec![
                MetricAggregate::QUANTILE_75,
                MetricAggregate::MINIMUM,
                MetricAggregate::QUANTILE_25,
            ],
            offset: Some(1),
            max: Some(2),
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert_eq!(
            stmt.binds,
            vec![
                BindValue::Real(0.75),
                BindValue::Real(0.25),
                ms(0),
                ms(3),
                BindValue::TextArray(vec!["s".into(), "x".into()]),
                BindValue::Integer(1),
                BindValue::Integer(2),
            ]
        );
        assert!(stmt.sql.contains("percentile_cont(val, ?1) AS a0"));
        assert!(stmt.sql.contains("MIN(val) AS a1"));
        assert!(stmt.sql.contains("percentile_cont(val, ?2) AS a2"));
        assert!(stmt.sql.contains("WHERE ts >= ?3 AND ts < ?4 AND mtype IN rarray(?5)"));
        assert!(stmt.sql.contains("GROUP BY mname"));
        assert!(stmt.sql.ends_with(" ORDER BY g.mname, a.akey LIMIT ?7 OFFSET ?6"));
        assert_eq!(stmt.max_placeholder_index(), stmt.binds.len());
    }

    #[test]
    fn aggregate_keys_follow_key_order() {
        let f = MetricFilter {
            aggregates: vec![
                MetricAggregate::QUANTILE_75,
                MetricAggregate::MINIMUM,
                MetricAggregate::AVERAGE,
            ],
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert!(stmt.sql.contains(
            "CASE a.akey WHEN 'avg' THEN g.a2 WHEN 'min' THEN g.a1 WHEN 'q:75' THEN g.a0 END AS val"
        ));
        assert!(stmt.sql.contains(
            "CROSS JOIN (SELECT 'avg' AS akey UNION ALL SELECT 'min' AS akey UNION ALL SELECT 'q:75' AS akey) AS a"
        ));
    }

    #[test]
    fn aggregate_singular_selectors_bind_as_arrays() {
        let f = MetricFilter {
            metric_type: Some("s".into()),
            name: Some("cpu".into()),
            aggregates: vec![MetricAggregate::MAXIMUM],
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert_eq!(
            stmt.binds,
            vec![
                BindValue::TextArray(vec!["s".into()]),
                BindValue::TextArray(vec!["cpu".into()]),
            ]
        );
        assert!(stmt.sql.contains("mtype IN rarray(?1) AND mname IN rarray(?2)"));
    }

    #[test]
    fn aggregate_user_sorts_map_to_projection() {
        let f = MetricFilter {
            aggregates: vec![MetricAggregate::SUM],
            sorts: vec![SortDescriptor::desc(SortField::Value)],
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert!(stmt.sql.ends_with(" ORDER BY val DESC, g.mname, a.akey"));
    }

    #[test]
    fn most_recent_wraps_window_query() {
        let f = MetricFilter {
            metric_type: Some("t1".into()),
            most_recent: true,
            sorts: SORT_BY_TYPE_NAME.to_vec(),
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT ts, mtype, mname, val FROM (SELECT ts, mtype, mname, val, \
             ROW_NUMBER() OVER (PARTITION BY mtype, mname ORDER BY ts DESC) AS rn \
             FROM mtr_metric WHERE mtype = ?1) AS r WHERE rn = 1 ORDER BY mtype, mname, ts"
        );
        assert_eq!(stmt.binds, vec![text("t1")]);
    }

    #[test]
    fn count_drops_order_and_pagination() {
        let f = MetricFilter {
            start_date: Some(ts(1)),
            offset: Some(3),
            max: Some(3),
            ..Default::default()
        };
        let stmt = count_statement(&f).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) FROM (SELECT ts, mtype, mname, val FROM mtr_metric WHERE ts >= ?1) AS c"
        );
        assert_eq!(stmt.binds, vec![ms(1)]);
    }

    #[test]
    fn delete_uses_raw_criteria() {
        let f = MetricFilter {
            end_date: Some(ts(6)),
            metric_type: Some("t1".into()),
            ..Default::default()
        };
        let stmt = delete_statement(&f).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM mtr_metric WHERE ts < ?1 AND mtype = ?2");
        assert_eq!(stmt.binds, vec![ms(6), text("t1")]);
    }

    #[test]
    fn delete_rejects_aggregates() {
        let f = MetricFilter {
            aggregates: vec![MetricAggregate::MINIMUM],
            ..Default::default()
        };
        assert!(matches!(
            delete_statement(&f),
            Err(MetricsError::InvalidFilter(_))
        ));
    }

    #[test]
    fn builder_is_deterministic() {
        let f = MetricFilter {
            start_date: Some(ts(0)),
            names: vec!["b".into(), "a".into()],
            aggregates: vec![
                MetricAggregate::QUANTILE_25,
                MetricAggregate::AVERAGE,
                MetricAggregate::quantile(0.9).unwrap(),
            ],
            sorts: vec![SortDescriptor::desc(SortField::Name)],
            max: Some(7),
            ..Default::default()
        };
        let a = select_statement(&f).unwrap();
        let b = select_statement(&f.clone()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn oversized_pagination_rejected() {
        let f = MetricFilter {
            max: Some(u64::MAX),
            ..Default::default()
        };
        assert!(matches!(
            select_statement(&f),
            Err(MetricsError::InvalidFilter(_))
        ));
    }

    #[test]
    fn placeholder_index_matches_bind_count() {
        let f = MetricFilter {
            start_date: Some(ts(0)),
            end_date: Some(ts(9)),
            types: vec!["a".into(), "b".into(), "c".into()],
            name: Some("n".into()),
            offset: Some(0),
            max: Some(12),
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert_eq!(stmt.max_placeholder_index(), stmt.binds.len());
        assert_eq!(stmt.binds.len(), 8);
    }

    #[test]
    fn sub_millisecond_date_bounds_round_up() {
        let f = MetricFilter {
            start_date: Some(ts(1) + TimeDelta::microseconds(500)),
            end_date: Some(ts(2) + TimeDelta::nanoseconds(1)),
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        assert_eq!(
            stmt.binds,
            vec![
                BindValue::Integer(1_720_000_001 * 1000 + 1),
                BindValue::Integer(1_720_000_002 * 1000 + 1),
            ]
        );

        let whole = MetricFilter {
            start_date: Some(ts(1) + TimeDelta::milliseconds(3)),
            ..Default::default()
        };
        let stmt = delete_statement(&whole).unwrap();
        assert_eq!(
            stmt.binds,
            vec![BindValue::Integer(1_720_000_001 * 1000 + 3)]
        );
    }

    #[test]
    fn quantile_binds_follow_declaration_order() {
        let aggregates = vec![
            MetricAggregate::SUM,
            MetricAggregate::QUANTILE_75,
            "q:90".parse::<MetricAggregate>().unwrap(),
            MetricAggregate::AVERAGE,
            MetricAggregate::QUANTILE_25,
        ];
        let f = MetricFilter {
            aggregates: aggregates.clone(),
            ..Default::default()
        };
        let stmt = select_statement(&f).unwrap();
        let fractions: Vec<f64> = stmt
            .binds
            .iter()
            .filter_map(|b| match b {
                BindValue::Real(v) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(fractions, declaration_order_parameters(&aggregates));
        assert_eq!(fractions, vec![0.75, 0.9, 0.25]);
    }

    #[test]
    fn literal_quotes_are_escaped() {
        assert_eq!(sql_literal("it's"), "'it''s'");
    }

    #[test]
    fn get_and_insert_statements() {
        let m = Metric::new(ts(0), "t", "n", 1.25);
        let insert = insert_statement(&m);
        assert_eq!(
            insert.sql,
            "INSERT INTO mtr_metric (ts, mtype, mname, val) VALUES (?1, ?2, ?3, ?4)"
        );
        assert_eq!(
            insert.binds,
            vec![ms(0), text("t"), text("n"), BindValue::Real(1.25)]
        );

        let get = get_statement(m.key());
        assert_eq!(
            get.sql,
            "SELECT ts, mtype, mname, val FROM mtr_metric WHERE ts = ?1 AND mtype = ?2 AND mname = ?3"
        );
        assert_eq!(get.binds.len(), 3);
    }
}
