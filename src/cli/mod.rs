//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Command-line interface for Skipan

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

pub mod check;
pub mod status;
pub mod sync;

/// Skipan - Compose-to-quadlet transpiler and systemd reconciler
#[derive(Parser, Debug)]
#[command(
    name = "skipan",
    author = "Svalinn Project",
    version,
    about = "Transpiles docker-compose projects into quadlet units and reconciles them through systemd",
    long_about = None
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true, env = "SKIPAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Quadlet unit directory
    #[arg(long, global = true, env = "SKIPAN_UNIT_DIR")]
    pub unit_dir: Option<PathBuf>,

    /// Path to the tracking database
    #[arg(long, global = true, env = "SKIPAN_DB")]
    pub db_path: Option<PathBuf>,

    /// Drive the user systemd instance instead of the system one
    #[arg(long, global = true)]
    pub user: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert compose projects and reconcile the unit set with systemd
    Sync(sync::SyncArgs),

    /// Load and validate compose projects without touching the host
    Check(check::CheckArgs),

    /// Show tracked unit records
    Status(status::StatusArgs),
}

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = Config::resolve(
        cli.config.as_deref(),
        cli.user,
        cli.unit_dir.clone(),
        cli.db_path.clone(),
    )?;

    match &cli.command {
        Commands::Sync(args) => sync::execute(args, &config).await,
        Commands::Check(args) => check::execute(args).await,
        Commands::Status(args) => status::execute(args, &config).await,
    }
}
