//! Maqam CLI — curate cover/original video pairs into a reviewed dataset.
//!
//! Fetches cover videos from a playlist or channel, finds and scores the
//! original of each, and lets a reviewer accept, override, or reject every
//! match before exporting the dataset as CSV.

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
