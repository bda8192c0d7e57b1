//! `nmetrics` command line: record, list, purge and inspect metrics.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};

use crate::config::MetricsConfig;
use crate::metrics::{
    FilterResults, METRIC_TYPE_SAMPLE, Metric, MetricAggregate, MetricDao, MetricFilter,
    SortDescriptor, SqliteMetricDao,
};

#[derive(Parser, Debug)]
#[command(name = "nmetrics", version, about = "Store, query and purge local device metrics")]
pub struct Cli {
    /// Database file (overrides the config file)
    #[arg(long, global = true, env = "NODE_METRICS_DB")]
    pub db: Option<PathBuf>,

    /// Config file (default: platform config dir)
    #[arg(long, global = true, env = "NODE_METRICS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store one metric
    Record {
        #[arg(long = "type", default_value = METRIC_TYPE_SAMPLE)]
        metric_type: String,
        #[arg(long)]
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        value: f64,
        /// RFC 3339 timestamp (default: now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Query stored metrics, optionally aggregated
    List(ListArgs),
    /// Delete metrics older than a cutoff
    Purge {
        /// Delete rows older than this many seconds
        #[arg(long)]
        older_than: u64,
        #[command(flatten)]
        selectors: SelectorArgs,
    },
    /// Show row count and store statistics
    Status {
        #[arg(long)]
        json: bool,
    },
}

/// Type and name selectors shared by list and purge.
#[derive(Args, Debug, Default)]
pub struct SelectorArgs {
    #[arg(long = "type", conflicts_with = "types")]
    pub metric_type: Option<String>,
    /// Comma separated type allow-list
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<String>,
    #[arg(long, conflicts_with = "names")]
    pub name: Option<String>,
    /// Comma separated name allow-list
    #[arg(long, value_delimiter = ',')]
    pub names: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Inclusive RFC 3339 lower bound
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,
    /// Exclusive RFC 3339 upper bound
    #[arg(long)]
    pub end: Option<DateTime<Utc>>,
    #[command(flatten)]
    pub selectors: SelectorArgs,
    /// Aggregate keys: min, max, avg, cnt, sum, q:NN
    #[arg(long = "agg", value_delimiter = ',')]
    pub aggregates: Vec<MetricAggregate>,
    /// Sort terms: ts|type|name|value[:desc]
    #[arg(long = "sort", value_delimiter = ',')]
    pub sorts: Vec<SortDescriptor>,
    #[arg(long)]
    pub offset: Option<u64>,
    #[arg(long)]
    pub max: Option<u64>,
    /// Only the newest row per type and name
    #[arg(long)]
    pub most_recent: bool,
    /// Also report the total number of matching rows
    #[arg(long)]
    pub count: bool,
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    pub fn to_filter(&self) -> MetricFilter {
        MetricFilter {
            start_date: self.start,
            end_date: self.end,
            metric_type: self.selectors.metric_type.clone(),
            types: self.selectors.types.clone(),
            name: self.selectors.name.clone(),
            names: self.selectors.names.clone(),
            aggregates: self.aggregates.clone(),
            sorts: self.sorts.clone(),
            offset: self.offset,
            max: self.max,
            most_recent: self.most_recent,
            with_total_results_count: self.count,
        }
    }
}

/// Build the purge filter: everything selected that is older than the cutoff.
pub fn purge_filter(
    now: DateTime<Utc>,
    older_than_secs: u64,
    selectors: &SelectorArgs,
) -> Result<MetricFilter> {
    let age = i64::try_from(older_than_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .context("--older-than is out of range")?;
    let cutoff = now
        .checked_sub_signed(age)
        .context("--older-than reaches before the earliest timestamp")?;
    Ok(MetricFilter {
        end_date: Some(cutoff),
        metric_type: selectors.metric_type.clone(),
        types: selectors.types.clone(),
        name: selectors.name.clone(),
        names: selectors.names.clone(),
        ..Default::default()
    })
}

/// Resolve configuration and the database, then run one command.
pub fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => MetricsConfig::load_from(path),
        None => MetricsConfig::load(),
    }
    .context("loading configuration")?;

    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => config.database_path()?,
    };
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let dao = SqliteMetricDao::open_with_config(&db_path, &config)
        .with_context(|| format!("opening {}", db_path.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&dao, cli.command, &mut out)
}

/// Run a command against an open store, writing its output.
pub fn execute(dao: &SqliteMetricDao, command: Commands, out: &mut dyn Write) -> Result<()> {
    match command {
        Commands::Record {
            metric_type,
            name,
            value,
            at,
        } => {
            let metric = Metric::new(at.unwrap_or_else(Utc::now), metric_type, name, value);
            let key = dao.save(&metric)?;
            writeln!(out, "recorded {key}")?;
        }
        Commands::List(args) => {
            let results = dao.find_filtered(&args.to_filter())?;
            if args.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&results)?)?;
            } else {
                write_table(out, results)?;
            }
        }
        Commands::Purge {
            older_than,
            selectors,
        } => {
            let filter = purge_filter(Utc::now(), older_than, &selectors)?;
            let deleted = dao.delete_filtered(&filter)?;
            writeln!(out, "deleted {deleted} metrics")?;
        }
        Commands::Status { json } => {
            let status = dao.status()?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&status)?)?;
            } else {
                writeln!(out, "rows:            {}", status.row_count)?;
                writeln!(out, "stored:          {}", status.metrics_stored)?;
                writeln!(out, "deleted:         {}", status.metrics_deleted)?;
                writeln!(out, "stat log every:  {}", status.stat_log_frequency)?;
            }
        }
    }
    Ok(())
}

fn write_table(out: &mut dyn Write, results: FilterResults<Metric>) -> Result<()> {
    let summary = results.total_results().map(|total| {
        (
            results.returned_result_count(),
            total,
            results.starting_offset(),
        )
    });
    for metric in results {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            metric
                .timestamp()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            metric.metric_type(),
            metric.name(),
            metric.value()
        )?;
    }
    if let Some((returned, total, offset)) = summary {
        writeln!(out, "# {returned} of {total} (offset {offset})")?;
    }
    Ok(())
}
