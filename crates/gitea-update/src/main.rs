// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! gitea-update - Entry point for the updater binary

use clap::{CommandFactory, Parser};
use gitea_update::{App, Cli};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "gitea_update=debug" } else { "gitea_update=info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !cli.has_action() {
        Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    }

    let app = App::from_cli(cli)?;
    if let Err(e) = app.run().await {
        tracing::error!("Update run failed: {e}");
        return Ok(ExitCode::from(e.exit_code()));
    }

    Ok(ExitCode::SUCCESS)
}
