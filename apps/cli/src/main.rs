//! catalogwriter CLI: a queue worker that turns DCAT dataset graphs into
//! CKAN `package_create` requests.
//!
//! Graph files stand in for queue messages; each one is converted, enriched
//! with its DQV quality metrics, and submitted without waiting for the
//! catalog's answer.

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
