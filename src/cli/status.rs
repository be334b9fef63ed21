//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! `skipan status` command implementation

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::config::Config;
use crate::state::UnitStore;

/// Arguments for the `status` command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output format (table, json)
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(Tabled)]
struct UnitRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "TYPE")]
    kind: String,
    #[tabled(rename = "HASH")]
    hash: String,
    #[tabled(rename = "LAST WRITTEN")]
    last_written: String,
}

pub async fn execute(args: &StatusArgs, config: &Config) -> Result<()> {
    let store = UnitStore::open(&config.db_path).context("opening tracking database")?;
    let units = store.find_all()?;

    match args.format.as_str() {
        "json" => {
            #[derive(Serialize)]
            struct UnitStatus {
                name: String,
                kind: String,
                content_hash: String,
                created_at: String,
                last_written_at: String,
            }

            let statuses: Vec<_> = units
                .into_iter()
                .map(|u| UnitStatus {
                    name: u.name,
                    kind: u.kind.to_string(),
                    content_hash: u.content_hash,
                    created_at: u.created_at,
                    last_written_at: u.last_written_at,
                })
                .collect();

            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
        _ => {
            let rows: Vec<UnitRow> = units
                .into_iter()
                .map(|u| UnitRow {
                    name: u.name,
                    kind: u.kind.to_string(),
                    hash: u.content_hash.chars().take(12).collect(),
                    last_written: u.last_written_at,
                })
                .collect();

            println!("{}", Table::new(rows));
        }
    }

    Ok(())
}
