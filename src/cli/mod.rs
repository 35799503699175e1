//! Command-line interface
//!
//! `freeze` runs the workflow non-interactively from flags; `interactive`
//! reproduces the guided session: prompts validate as they go and re-prompt
//! on error instead of crashing.

pub mod prompt;

use crate::catalog::{CatalogClient, Dataset, Layer};
use crate::config::{Config, STAGING_API_URL};
use crate::error::{Error, Result};
use crate::exec::{HttpExecutor, SqlExecutor};
use crate::freeze::{freeze_layer, FreezeRequest, SQL_PROVIDER};
use crate::time::{check_not_future, parse_timestamp};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use prompt::{ask, ask_yes_no};

/// Freeze a time window of a live map layer into an immutable table
#[derive(Parser)]
#[command(name = "layer-freeze")]
#[command(about = "Freeze a time window of a live map layer into an immutable table")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Freeze a layer from flags, no prompts
    Freeze {
        /// Layer id to freeze
        #[arg(short, long)]
        layer: String,
        /// Start of the window (date, datetime, "today" or "yesterday")
        #[arg(long)]
        start: String,
        /// End of the window, exclusive
        #[arg(long)]
        end: String,
        /// Time column; defaults to the dataset's main date field
        #[arg(long)]
        time_field: Option<String>,
        /// Source table; defaults to the dataset's backing table
        #[arg(long)]
        table: Option<String>,
        /// Accept a window reaching past the available data
        #[arg(long)]
        ignore_future: bool,
        /// Talk to the production catalog instead of staging
        #[arg(long)]
        production: bool,
    },
    /// Guided interactive session
    Interactive,
}

/// Dispatch a parsed command line
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Freeze {
            layer,
            start,
            end,
            time_field,
            table,
            ignore_future,
            production,
        } => run_freeze(layer, start, end, time_field, table, ignore_future, production),
        Commands::Interactive => run_interactive(),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_freeze(
    layer: String,
    start: String,
    end: String,
    time_field: Option<String>,
    table: Option<String>,
    ignore_future: bool,
    production: bool,
) -> Result<()> {
    let config = Config::from_env(production)?;
    let catalog = CatalogClient::new(&config)?;
    let executor = HttpExecutor::new(&config)?;

    let start = parse_timestamp(&start, None)?;
    let end = parse_timestamp(&end, None)?;
    let mut request = FreezeRequest::new(layer, start, end).with_ignore_future(ignore_future);
    if let Some(time_field) = time_field {
        request = request.with_time_field(time_field);
    }
    if let Some(table) = table {
        request = request.with_table_name(table);
    }

    let outcome = freeze_layer(&catalog, &executor, &request)?;
    println!("Created layer {} ({})", outcome.layer.attributes.name, layer_id(&outcome.layer));
    println!("Created table \"{}\".{}", config.exec_user, outcome.table);
    Ok(())
}

fn layer_id(layer: &Layer) -> &str {
    layer.id.as_deref().unwrap_or("<no id>")
}

fn run_interactive() -> Result<()> {
    let staging = ask_yes_no(&format!("\nUse test environment ({})?", STAGING_API_URL), true)?;
    let config = Config::from_env(!staging)?;
    println!("Using {}", config.api_url);

    let catalog = CatalogClient::new(&config)?;
    if !catalog.check_auth() {
        println!("Warning: could not verify credentials against the catalog");
    }
    let executor = HttpExecutor::new(&config)?;

    let layer = match ask_layer(&catalog)? {
        Some(layer) => layer,
        None => return Ok(()),
    };
    let mut dataset = catalog.get_dataset(layer.dataset_id())?;
    let table = dataset.attributes.table_name.clone();

    let time_field = match dataset.attributes.main_date_field.clone() {
        Some(field) => field,
        None => match ask_time_field(&catalog, &executor, &mut dataset, &table)? {
            Some(field) => field,
            None => return Ok(()),
        },
    };

    println!("\nEnter start date for freeze");
    let start = ask_date()?;
    println!("Query start: {}", start);
    println!("\nEnter end date for freeze");
    let end = ask_end_date(&executor, &table, &time_field)?;
    println!("Query end: {}", end);

    let request = FreezeRequest::new(layer.id.clone().unwrap_or_default(), start, end)
        .with_time_field(time_field)
        .with_table_name(table)
        .with_ignore_future(true);
    let outcome = freeze_layer(&catalog, &executor, &request)?;

    println!("\nCreated new layer.");
    println!("Layer id: {}", layer_id(&outcome.layer));
    println!("Layer name: {}", outcome.layer.attributes.name);
    println!("\nCreated new table.");
    println!("Table name: \"{}\".{}", config.exec_user, outcome.table);

    if !ask_yes_no("\nKeep new layer and table?", true)? {
        catalog.delete(&outcome.layer)?;
        println!("Deleted layer: {}", layer_id(&outcome.layer));
        executor.drop_table(&outcome.table)?;
        println!("Dropped table: {}", outcome.table);
    } else if ask_yes_no("\nRename layer?", false)? {
        let name = ask("Enter name:")?;
        if !name.is_empty() {
            let mut renamed = outcome.layer.clone();
            renamed.attributes.name = name;
            let renamed = catalog.update(&renamed)?;
            println!("Renamed layer to {}", renamed.attributes.name);
        }
    }
    Ok(())
}

/// Prompt for a layer id until one resolves to a SQL-backed layer; an empty
/// answer aborts the session.
fn ask_layer(catalog: &CatalogClient) -> Result<Option<Layer>> {
    loop {
        let id = ask("\nID of layer to freeze:")?;
        if id.is_empty() {
            return Ok(None);
        }
        match catalog.get_layer(&id) {
            Ok(layer) if layer.attributes.provider == SQL_PROVIDER => {
                println!("Found layer: {}", layer.attributes.name);
                return Ok(Some(layer));
            }
            Ok(_) => println!("Layer must be backed by the '{}' provider", SQL_PROVIDER),
            Err(e) => println!("Could not find layer with id {} ({})", id, e),
        }
    }
}

/// The dataset defines no main date field: ask for one, validate it against
/// the table, and offer to save it back to the catalog.
fn ask_time_field(
    catalog: &CatalogClient,
    executor: &dyn SqlExecutor,
    dataset: &mut Dataset,
    table: &str,
) -> Result<Option<String>> {
    println!("\nDataset does not have a main date field defined.");
    let field = loop {
        let field = ask("Time field:")?;
        if field.is_empty() {
            return Ok(None);
        }
        match validate_time_field(executor, &field, table) {
            Ok(()) => break field,
            Err(e) => println!("Field does not appear to contain valid datetimes ({})", e),
        }
    };
    let save = ask_yes_no(
        &format!(
            "\nSave {} as main date field of {} on the catalog?",
            field, dataset.attributes.name
        ),
        false,
    )?;
    if save {
        println!("Saving...");
        dataset.attributes.main_date_field = Some(field.clone());
        catalog.update(dataset)?;
    }
    Ok(Some(field))
}

fn validate_time_field(executor: &dyn SqlExecutor, field: &str, table: &str) -> Result<()> {
    let rows = executor.field_values(field, table, None, Some(1))?;
    match rows.first() {
        Some(value) => parse_timestamp(value, None).map(|_| ()),
        None => Ok(()),
    }
}

fn ask_date() -> Result<DateTime<Utc>> {
    loop {
        let text = ask("(YYYY-MM-DD | today | yesterday):")?;
        match parse_timestamp(&text, None) {
            Ok(date) => return Ok(date),
            Err(_) => println!("Invalid date."),
        }
    }
}

/// Like [`ask_date`] but warns when the window end reaches past the
/// available data, with an explicit override.
fn ask_end_date(
    executor: &dyn SqlExecutor,
    table: &str,
    time_field: &str,
) -> Result<DateTime<Utc>> {
    loop {
        let date = ask_date()?;
        match check_not_future(date, executor, table, time_field) {
            Ok(()) => return Ok(date),
            Err(Error::FutureData(message)) => {
                println!("{}", message);
                if ask_yes_no("Continue anyway?", false)? {
                    return Ok(date);
                }
            }
            Err(e) => println!("Could not check the window end ({})", e),
        }
    }
}
