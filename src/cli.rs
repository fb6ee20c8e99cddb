// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines the upgrade and revert subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pg-upgrader")]
#[command(about = "Major-version PostgreSQL upgrades with automatic rollback")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to $PG_UPGRADER_CONFIG or /etc/pg-upgrader/config.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upgrade the data directory to the newly installed major version
    PgUpgrade {
        /// Directory for the new and preserved data directories
        #[arg(long, value_name = "PATH")]
        tmp_dir: Option<PathBuf>,

        /// Pause before upgrading so it can still be aborted
        #[arg(long)]
        wait: bool,

        /// Do not unregister a secondary from the HA cluster
        #[arg(long)]
        skip_unregister: bool,

        /// Upgrade to this major version instead of the bundled new one
        #[arg(long, value_name = "MAJOR")]
        target_version: Option<u32>,

        /// Time limit for each initdb, pg_upgrade and analyze run (e.g. "2h")
        #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
        timeout: Option<Duration>,

        /// Skip the free space check for the new data directory
        #[arg(long)]
        skip_disk_check: bool,
    },

    /// Return to the previous major version's binaries and data directory
    RevertPgUpgrade {
        /// Directory holding the preserved data directory
        #[arg(long, value_name = "PATH")]
        tmp_dir: Option<PathBuf>,

        /// Revert to this major version instead of the bundled default
        #[arg(long, value_name = "MAJOR")]
        target_version: Option<u32>,
    },
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}
