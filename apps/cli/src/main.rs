//! Newsletter CLI: research, write, edit and send one AI newsletter issue.
//!
//! Meant to be triggered by an external scheduler (cron, systemd timer);
//! each `newsletter run` produces exactly one issue.

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
