//! layer-freeze: time-windowed snapshots of live map layers
//!
//! Freezes a slice of a continuously updated geospatial dataset: rows inside
//! a `[start, end)` window are copied into a new immutable table, and an
//! unpublished copy of the layer is created pointing at it. The live layer
//! stays untouched.
//!
//! The heart of the crate is the SQL rewriting engine in [`sql`]: it
//! tokenizes the layer's query, locates every WHERE-clause sub-expression
//! filtering on the designated time column, and swaps each for a clause
//! bounding it to the window, leaving every other predicate alone.
//!
//! # Example
//!
//! ```no_run
//! use layer_freeze::prelude::*;
//!
//! # fn example() -> layer_freeze::error::Result<()> {
//! let config = Config::from_env(false)?;
//! let catalog = CatalogClient::new(&config)?;
//! let executor = HttpExecutor::new(&config)?;
//!
//! let start = parse_timestamp("2020-02-01", None)?;
//! let end = parse_timestamp("2020-02-02", None)?;
//! let request = FreezeRequest::new("b4f1bd67-d0b7", start, end);
//! let outcome = freeze_layer(&catalog, &executor, &request)?;
//! println!("created {} over {}", outcome.layer.attributes.name, outcome.table);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod freeze;
pub mod sql;
pub mod time;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::catalog::{CatalogClient, Dataset, Layer, LayerCatalog};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::exec::{HttpExecutor, Privacy, SqlExecutor};
    pub use crate::freeze::{freeze_layer, frozen_table_name, FreezeOutcome, FreezeRequest};
    pub use crate::sql::{bounded_clause, find_time_clauses, rewrite};
    pub use crate::time::{check_not_future, parse_timestamp, TimeRange};
}
