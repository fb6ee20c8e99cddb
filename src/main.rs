// ABOUTME: Entry point for the pg-upgrader CLI application.
// ABOUTME: Parses arguments and dispatches to the upgrade and revert handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use pg_upgrader::config::Config;
use pg_upgrader::error::{Error, Result};
use pg_upgrader::output::{Output, OutputMode};
use pg_upgrader::upgrade::{RevertOptions, UpgradeOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = OutputMode::from_flags(cli.quiet, cli.json);

    if let Err(e) = run(cli, Output::new(mode)).await {
        let output = Output::new(mode);
        output.error(&e.to_string());
        if let Error::Upgrade(upgrade) = &e
            && let Some(captured) = upgrade.command_output()
        {
            output.command_output(&captured.stdout, &captured.stderr);
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    let config = Config::discover(cli.config.as_deref())?;

    match cli.command {
        Commands::PgUpgrade {
            tmp_dir,
            wait,
            skip_unregister,
            target_version,
            timeout,
            skip_disk_check,
        } => {
            let options = UpgradeOptions {
                tmp_dir,
                wait,
                skip_unregister,
                target_version,
                timeout,
                skip_disk_check,
            };
            commands::upgrade(config, options, output).await
        }
        Commands::RevertPgUpgrade {
            tmp_dir,
            target_version,
        } => {
            let options = RevertOptions {
                tmp_dir,
                target_version,
            };
            commands::revert(config, options, output).await
        }
    }
}
