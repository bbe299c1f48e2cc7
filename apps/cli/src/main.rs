//! jbook CLI: fuse DoD budget justification books into an enriched dataset.
//!
//! Parses R-1D/XML budget tables, slices Exhibit R-2 narratives out of the
//! J-Book PDFs, and tags each cost line for technology relevance.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
