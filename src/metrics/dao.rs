//! SQLite-backed metric data access.
//!
//! [`SqliteMetricDao`] is the thin execution layer over the pure builders in
//! [`super::statement`]: it binds [`BindValue`]s to a connection, steps result
//! rows one at a time and maps each into a [`Metric`]. Saves are plain
//! inserts; a repeated key is reported as [`MetricsError::DuplicateKey`] and
//! never overwrites the stored value.

use std::ffi::CStr;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::vtab::array::Array;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params_from_iter};
use serde::Serialize;

use super::filter::MetricFilter;
use super::results::FilterResults;
use super::statement::{
    BindValue, PERCENTILE_FUNCTION, Statement, TABLE_NAME, count_statement, delete_statement,
    get_statement, insert_statement, select_statement,
};
use super::stats::{MetricDaoStat, MetricDaoStats};
use super::types::{Metric, MetricKey, MetricsError, MetricsResult, from_epoch_millis};
use crate::config::MetricsConfig;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Version of the metric table layout.
pub const TABLE_VERSION: i64 = 1;

/// Key/value table recording the metric table version.
pub const META_TABLE_NAME: &str = "mtr_metric_meta";

const VERSION_META_KEY: &str = "mtr_metric.version";

const STATEMENT_CACHE_CAPACITY: usize = 32;

/// Pointer type tag the `rarray` table-valued function accepts.
const RARRAY_POINTER_TYPE: &CStr = c"rarray";

// ---------------------------------------------------------------------------
// DAO contract
// ---------------------------------------------------------------------------

/// What a batch callback wants to happen after handling a row.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BatchCallbackResult {
    Continue,
    Stop,
}

/// Insert-only metric persistence with filtered find and delete.
pub trait MetricDao {
    /// Insert a metric, returning its key. Fails with
    /// [`MetricsError::DuplicateKey`] when the key is already stored.
    fn save(&self, metric: &Metric) -> MetricsResult<MetricKey>;

    /// Fetch one metric by key.
    fn get(&self, key: &MetricKey) -> MetricsResult<Option<Metric>>;

    /// Run a filtered, possibly aggregated and paginated, query.
    fn find_filtered(&self, filter: &MetricFilter) -> MetricsResult<FilterResults<Metric>>;

    /// Delete every raw row matching the filter, atomically, returning the
    /// number removed.
    fn delete_filtered(&self, filter: &MetricFilter) -> MetricsResult<u64>;

    /// Stream filtered rows to a callback one at a time, returning how many
    /// rows were handed over.
    fn batch_process(
        &self,
        filter: &MetricFilter,
        callback: &mut dyn FnMut(Metric) -> BatchCallbackResult,
    ) -> MetricsResult<u64>;
}

/// Row count and statistics snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DaoStatus {
    pub row_count: u64,
    pub metrics_stored: u64,
    pub metrics_deleted: u64,
    pub stat_log_frequency: u64,
}

// ---------------------------------------------------------------------------
// SqliteMetricDao
// ---------------------------------------------------------------------------

/// [`MetricDao`] over a single SQLite connection.
///
/// Calls are serialized on the connection; transactional isolation is
/// SQLite's own.
pub struct SqliteMetricDao {
    conn: Mutex<Connection>,
    stats: MetricDaoStats,
}

impl SqliteMetricDao {
    /// Open (creating if needed) a database file with default settings.
    pub fn open(path: &Path) -> MetricsResult<Self> {
        Self::open_with_config(path, &MetricsConfig::default())
    }

    /// Open a database file using the busy timeout and statistics settings
    /// of a config.
    pub fn open_with_config(path: &Path, config: &MetricsConfig) -> MetricsResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        let dao = Self::from_connection(conn)?;
        dao.stats.set_log_frequency(config.stat_log_frequency);
        tracing::debug!(path = %path.display(), "opened metric store");
        Ok(dao)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> MetricsResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection: registers SQL helpers and creates the
    /// schema when missing.
    pub fn from_connection(conn: Connection) -> MetricsResult<Self> {
        configure_connection(&conn)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            stats: MetricDaoStats::default(),
        })
    }

    pub fn stats(&self) -> &MetricDaoStats {
        &self.stats
    }

    /// Number of stored metric rows.
    pub fn row_count(&self) -> MetricsResult<u64> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE_NAME}"), [], |r| r.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Row count plus the running statistics.
    pub fn status(&self) -> MetricsResult<DaoStatus> {
        Ok(DaoStatus {
            row_count: self.row_count()?,
            metrics_stored: self.stats.get(MetricDaoStat::MetricsStored),
            metrics_deleted: self.stats.get(MetricDaoStat::MetricsDeleted),
            stat_log_frequency: self.stats.log_frequency(),
        })
    }
}

impl MetricDao for SqliteMetricDao {
    fn save(&self, metric: &Metric) -> MetricsResult<MetricKey> {
        let stmt = insert_statement(metric);
        let conn = self.conn.lock();
        let mut prepared = conn.prepare_cached(&stmt.sql)?;
        match prepared.execute(params_from_iter(stmt.binds.iter())) {
            Ok(_) => {}
            Err(err) if is_primary_key_violation(&err) => {
                tracing::debug!(key = %metric.key(), "duplicate metric rejected");
                return Err(MetricsError::DuplicateKey(metric.key().clone()));
            }
            Err(err) => return Err(err.into()),
        }
        self.stats.increment(MetricDaoStat::MetricsStored);
        Ok(metric.key().clone())
    }

    fn get(&self, key: &MetricKey) -> MetricsResult<Option<Metric>> {
        let stmt = get_statement(key);
        let conn = self.conn.lock();
        let mut prepared = conn.prepare_cached(&stmt.sql)?;
        let metric = prepared
            .query_row(params_from_iter(stmt.binds.iter()), map_metric_row)
            .optional()?;
        Ok(metric)
    }

    fn find_filtered(&self, filter: &MetricFilter) -> MetricsResult<FilterResults<Metric>> {
        let stmt = select_statement(filter)?;
        let count_stmt = if filter.with_total_results_count {
            Some(count_statement(filter)?)
        } else {
            None
        };
        tracing::debug!(
            sql = %stmt.sql,
            binds = stmt.binds.len(),
            aggregate = filter.is_aggregate(),
            types = filter.has_type_criteria(),
            names = filter.has_name_criteria(),
            "find metrics"
        );

        let capacity = filter
            .max
            .and_then(|max| usize::try_from(max).ok())
            .map_or(stmt.fetch_size, |max| max.min(stmt.fetch_size));
        let mut results = Vec::with_capacity(capacity);

        let conn = self.conn.lock();
        stream_rows(&conn, &stmt, &mut |metric| {
            results.push(metric);
            BatchCallbackResult::Continue
        })?;

        let total_results = match count_stmt {
            Some(count_stmt) => {
                let mut prepared = conn.prepare_cached(&count_stmt.sql)?;
                let total: i64 =
                    prepared.query_row(params_from_iter(count_stmt.binds.iter()), |r| r.get(0))?;
                Some(u64::try_from(total).unwrap_or(0))
            }
            None => None,
        };

        Ok(FilterResults::new(
            results,
            total_results,
            filter.offset.unwrap_or(0),
        ))
    }

    fn delete_filtered(&self, filter: &MetricFilter) -> MetricsResult<u64> {
        let stmt = delete_statement(filter)?;
        if !filter.has_date_criteria() && !filter.has_type_criteria() && !filter.has_name_criteria()
        {
            tracing::warn!("deleting metrics with an empty filter removes every row");
        }
        tracing::debug!(sql = %stmt.sql, binds = stmt.binds.len(), "delete metrics");

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = tx.execute(&stmt.sql, params_from_iter(stmt.binds.iter()))?;
        tx.commit()?;

        let deleted = deleted as u64;
        self.stats.add(MetricDaoStat::MetricsDeleted, deleted);
        Ok(deleted)
    }

    fn batch_process(
        &self,
        filter: &MetricFilter,
        callback: &mut dyn FnMut(Metric) -> BatchCallbackResult,
    ) -> MetricsResult<u64> {
        let stmt = select_statement(filter)?;
        tracing::debug!(sql = %stmt.sql, binds = stmt.binds.len(), "batch process metrics");
        let conn = self.conn.lock();
        stream_rows(&conn, &stmt, callback)
    }
}

// ---------------------------------------------------------------------------
// Execution helpers
// ---------------------------------------------------------------------------

impl ToSql for BindValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            BindValue::Integer(v) => ToSqlOutput::from(*v),
            BindValue::Real(v) => ToSqlOutput::from(*v),
            BindValue::Text(s) => ToSqlOutput::from(s.as_str()),
            BindValue::TextArray(values) => {
                let array: Array = Rc::new(values.iter().cloned().map(Value::Text).collect());
                ToSqlOutput::from_rc(array, RARRAY_POINTER_TYPE)
            }
        })
    }
}

/// Step the statement's rows, mapping each into a metric for the sink until
/// the rows run out or the sink asks to stop.
fn stream_rows(
    conn: &Connection,
    stmt: &Statement,
    sink: &mut dyn FnMut(Metric) -> BatchCallbackResult,
) -> MetricsResult<u64> {
    let mut prepared = conn.prepare_cached(&stmt.sql)?;
    let mut rows = prepared.query(params_from_iter(stmt.binds.iter()))?;
    let fetch_size = stmt.fetch_size.max(1) as u64;
    let mut count = 0u64;
    while let Some(row) = rows.next()? {
        let metric = map_metric_row(row)?;
        count += 1;
        if count % fetch_size == 0 {
            tracing::trace!(count, "streamed metric rows");
        }
        if sink(metric) == BatchCallbackResult::Stop {
            break;
        }
    }
    Ok(count)
}

/// Map a `(ts, mtype, mname, val)` row.
fn map_metric_row(row: &Row<'_>) -> rusqlite::Result<Metric> {
    let ms: i64 = row.get(0)?;
    let timestamp =
        from_epoch_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))?;
    let metric_type: String = row.get(1)?;
    let name: String = row.get(2)?;
    let value: f64 = row.get(3)?;
    Ok(Metric::new(timestamp, metric_type, name, value))
}

fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

// ---------------------------------------------------------------------------
// Connection setup
// ---------------------------------------------------------------------------

fn configure_connection(conn: &Connection) -> MetricsResult<()> {
    rusqlite::vtab::array::load_module(conn)?;
    conn.create_aggregate_function(
        PERCENTILE_FUNCTION,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        PercentileCont,
    )?;
    conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
    Ok(())
}

fn init_schema(conn: &Connection) -> MetricsResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {TABLE_NAME} (
            ts INTEGER NOT NULL,
            mtype TEXT NOT NULL,
            mname TEXT NOT NULL,
            val REAL NOT NULL,
            PRIMARY KEY (ts, mtype, mname)
        );
        CREATE INDEX IF NOT EXISTS {TABLE_NAME}_name_idx ON {TABLE_NAME} (mname, ts);
        CREATE TABLE IF NOT EXISTS {META_TABLE_NAME} (
            skey TEXT NOT NULL PRIMARY KEY,
            svalue TEXT NOT NULL
        );"
    ))?;

    let stored: Option<String> = conn
        .query_row(
            &format!("SELECT svalue FROM {META_TABLE_NAME} WHERE skey = ?1"),
            [VERSION_META_KEY],
            |r| r.get(0),
        )
        .optional()?;
    match stored {
        None => {
            conn.execute(
                &format!("INSERT INTO {META_TABLE_NAME} (skey, svalue) VALUES (?1, ?2)"),
                [VERSION_META_KEY, &TABLE_VERSION.to_string()],
            )?;
            tracing::debug!(version = TABLE_VERSION, "created metric tables");
        }
        Some(version) => {
            let found = version.trim().parse::<i64>().unwrap_or(0);
            if found != TABLE_VERSION {
                return Err(MetricsError::SchemaVersion {
                    found,
                    expected: TABLE_VERSION,
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// percentile_cont(value, fraction)
// ---------------------------------------------------------------------------

/// Continuous-interpolation percentile aggregate. The fraction is read from
/// the first row of each group.
struct PercentileCont;

#[derive(Default)]
struct PercentileState {
    fraction: Option<f64>,
    values: Vec<f64>,
}

impl Aggregate<PercentileState, Option<f64>> for PercentileCont {
    fn init(&self, _ctx: &mut Context<'_>) -> rusqlite::Result<PercentileState> {
        Ok(PercentileState::default())
    }

    fn step(&self, ctx: &mut Context<'_>, acc: &mut PercentileState) -> rusqlite::Result<()> {
        if acc.fraction.is_none() {
            acc.fraction = Some(ctx.get::<f64>(1)?);
        }
        if let Some(value) = ctx.get::<Option<f64>>(0)? {
            acc.values.push(value);
        }
        Ok(())
    }

    fn finalize(
        &self,
        _ctx: &mut Context<'_>,
        acc: Option<PercentileState>,
    ) -> rusqlite::Result<Option<f64>> {
        Ok(acc.and_then(|state| {
            continuous_percentile(state.values, state.fraction.unwrap_or_default())
        }))
    }
}

/// Linear interpolation between the closest ranks; `None` for no values.
pub fn continuous_percentile(mut values: Vec<f64>, fraction: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let fraction = fraction.clamp(0.0, 1.0);
    let position = fraction * (values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    Some(values[lower] + (values[upper] - values[lower]) * weight)
}
