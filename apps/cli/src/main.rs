//! litscreen CLI: resumable literature-review screening and analysis.
//!
//! Screens search results for relevance in batches, reshapes download
//! results into a review sheet, and classifies downloaded documents with a
//! bounded worker pool. Every stage can be interrupted and rerun.

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
