//! layer-freeze: Main entry point

use clap::Parser;
use layer_freeze::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    run(cli)?;
    Ok(())
}
