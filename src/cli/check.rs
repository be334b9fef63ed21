//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! `skipan check` command implementation

use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;

use crate::cancel::CancelToken;
use crate::compose::{self, LoadOptions};

/// Arguments for the `check` command
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Directory tree containing compose projects
    pub path: PathBuf,
}

pub async fn execute(args: &CheckArgs) -> Result<()> {
    let cancel = CancelToken::new();
    let results = compose::load_all(&cancel, &args.path, &LoadOptions::default())?;

    if results.is_empty() {
        bail!("no compose projects found under {}", args.path.display());
    }

    let mut failures = 0usize;
    for item in &results {
        match &item.result {
            Ok(project) => {
                println!(
                    "ok    {} (project '{}', {} service(s))",
                    item.path.display(),
                    project.name,
                    project.services.len()
                );
            }
            Err(e) => {
                println!("error {}: {e}", item.path.display());
                failures += 1;
            }
        }
    }

    println!("\n{} project(s), {} failed", results.len(), failures);
    if failures > 0 {
        bail!("validation failed for {failures} project(s)");
    }
    Ok(())
}
