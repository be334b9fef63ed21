//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Skipan - Compose-to-quadlet transpiler and systemd reconciler
//!
//! The Ordering component of the Svalinn ecosystem: turns docker-compose
//! projects into rootless-container quadlet units and keeps the on-disk
//! unit set and running systemd state converged with them.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cancel;
mod cli;
mod compose;
mod config;
mod error;
mod graph;
mod naming;
mod reconcile;
mod secrets;
mod spec;
mod state;
mod systemd;
mod unit;

use cli::Cli;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Execute command
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { cli::execute(cli).await })
}
