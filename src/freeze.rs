//! Freeze workflow
//!
//! Copies the rows of a layer's backing table that fall inside a time window
//! into a new immutable table, then publishes an unpublished copy of the
//! layer pointing at that table. The live layer is never touched. There is
//! no rollback: a failure part-way leaves any materialized table and created
//! layer for the caller to clean up.

use crate::catalog::{Layer, LayerCatalog};
use crate::error::{Error, Result};
use crate::exec::{Privacy, SqlExecutor};
use crate::sql::{bounded_clause, find_time_clauses, rewrite};
use crate::time::{check_not_future, TimeRange};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Provider tag of SQL-backed layers; the only kind that can be frozen
pub const SQL_PROVIDER: &str = "cartodb";

/// Engine identifier length limit for table names
const MAX_TABLE_NAME: usize = 62;
/// Prefix kept verbatim when a computed name overflows
const NAME_KEEP: usize = 32;

const DEFAULT_VISIBILITY_ATTEMPTS: u32 = 60;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Parameters of one freeze run
#[derive(Debug, Clone)]
pub struct FreezeRequest {
    /// Layer to freeze
    pub layer_id: String,
    /// Start of the window
    pub start: DateTime<Utc>,
    /// End of the window (exclusive)
    pub end: DateTime<Utc>,
    /// Time column; the dataset's main date field when absent
    pub time_field: Option<String>,
    /// Source table; the dataset's backing table when absent
    pub table_name: Option<String>,
    /// Skip the future-data check, accepting an incomplete snapshot
    pub ignore_future: bool,
    /// How many times to retry making the new table visible
    pub visibility_attempts: u32,
    /// Delay between visibility retries
    pub poll_interval: Duration,
}

impl FreezeRequest {
    pub fn new(layer_id: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            layer_id: layer_id.into(),
            start,
            end,
            time_field: None,
            table_name: None,
            ignore_future: false,
            visibility_attempts: DEFAULT_VISIBILITY_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_time_field(mut self, time_field: impl Into<String>) -> Self {
        self.time_field = Some(time_field.into());
        self
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn with_ignore_future(mut self, ignore_future: bool) -> Self {
        self.ignore_future = ignore_future;
        self
    }

    pub fn with_visibility_attempts(mut self, attempts: u32) -> Self {
        self.visibility_attempts = attempts;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Result of a completed freeze run
#[derive(Debug, Clone)]
pub struct FreezeOutcome {
    /// The newly created, unpublished layer
    pub layer: Layer,
    /// Name of the frozen table backing it
    pub table: String,
}

/// Destination table name for a frozen window, deterministic for identical
/// inputs. Overflowing names keep their first 32 characters and append a
/// digest of the truncated remainder so distinct windows stay distinct.
pub fn frozen_table_name(table: &str, range: &TimeRange) -> String {
    let name = format!(
        "{}_{}_{}",
        table,
        range.start().format("%Y%m%d_%H%M"),
        range.end().format("%Y%m%d_%H%M"),
    );
    if name.len() <= MAX_TABLE_NAME {
        return name;
    }
    let (head, tail) = name.split_at(NAME_KEEP);
    let digest = hex::encode(Sha256::digest(tail.as_bytes()));
    let mut out = format!("{}_{}", head, digest);
    out.truncate(MAX_TABLE_NAME);
    out
}

/// Run the whole freeze workflow.
///
/// Fetches the layer, validates the window, rewrites the layer's query to
/// bound the time column, materializes the result into a new table, waits
/// for the engine to recognize it, and publishes an unpublished clone of the
/// layer pointing at it.
pub fn freeze_layer(
    catalog: &dyn LayerCatalog,
    executor: &dyn SqlExecutor,
    request: &FreezeRequest,
) -> Result<FreezeOutcome> {
    info!(layer = %request.layer_id, "fetching layer definition");
    let layer = catalog.layer(&request.layer_id)?;
    if layer.attributes.provider != SQL_PROVIDER {
        return Err(Error::ProviderMismatch {
            expected: SQL_PROVIDER.to_string(),
            actual: layer.attributes.provider.clone(),
        });
    }

    let (time_field, table_name) = resolve_defaults(catalog, &layer, request)?;
    let range = TimeRange::new(request.start, request.end);
    if !request.ignore_future {
        check_not_future(range.end(), executor, &table_name, &time_field)?;
    }

    let sql = layer.sql()?.to_lowercase();
    debug!(query = %sql, "source query");
    let clauses = find_time_clauses(&sql, &time_field)?;
    let bounded = bounded_clause(&time_field, &range);
    let rewritten = rewrite(&sql, &clauses, &bounded)?;
    debug!(query = %rewritten, "rewritten query");

    let new_table = frozen_table_name(&table_name, &range);
    if executor.table_exists(&new_table)? {
        info!(table = %new_table, "table exists, overwriting");
        executor.drop_table(&new_table)?;
    }
    info!(table = %new_table, "copying data to table");
    executor.create_table_from_query(&new_table, &rewritten)?;
    await_visibility(executor, &new_table, request)?;

    let name = format!(
        "{} ({} to {})",
        layer.attributes.name,
        range.start_iso(),
        range.end_iso(),
    );
    let mut copy = layer.clone_for(&name);
    copy.set_sql(&format!("SELECT * FROM {}", new_table))?;
    copy.attributes.published = false;

    info!(layer = %name, "uploading new layer");
    let created = catalog.create_layer(&copy)?;
    Ok(FreezeOutcome {
        layer: created,
        table: new_table,
    })
}

fn resolve_defaults(
    catalog: &dyn LayerCatalog,
    layer: &Layer,
    request: &FreezeRequest,
) -> Result<(String, String)> {
    if let (Some(time_field), Some(table_name)) = (&request.time_field, &request.table_name) {
        return Ok((time_field.clone(), table_name.clone()));
    }
    let dataset = catalog.dataset(layer.dataset_id())?;
    let time_field = match &request.time_field {
        Some(field) => field.clone(),
        None => dataset.attributes.main_date_field.clone().ok_or_else(|| {
            Error::Resource(format!(
                "dataset {} does not define a main date field",
                layer.dataset_id()
            ))
        })?,
    };
    let table_name = request
        .table_name
        .clone()
        .unwrap_or_else(|| dataset.attributes.table_name.clone());
    Ok((time_field, table_name))
}

/// The engine's catalog may lag table creation. Retry the visibility change
/// on a fixed interval; listing the engine's datasets between attempts is an
/// observed workaround that makes fresh tables appear.
fn await_visibility(
    executor: &dyn SqlExecutor,
    table: &str,
    request: &FreezeRequest,
) -> Result<()> {
    let mut last_error = None;
    for attempt in 1..=request.visibility_attempts {
        match executor.set_privacy(table, Privacy::Link) {
            Ok(()) => return Ok(()),
            Err(e) => {
                info!(attempt, "waiting for table to be available");
                last_error = Some(e);
                let _ = executor.refresh_datasets();
                if attempt < request.visibility_attempts {
                    thread::sleep(request.poll_interval);
                }
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        Error::Configuration("visibility_attempts must be at least 1".to_string())
    }))
}
