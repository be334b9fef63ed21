//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! `skipan sync` command implementation

use anyhow::{bail, Context, Result};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::compose::{self, LoadOptions, LoadResult};
use crate::config::Config;
use crate::graph::DependencyGraph;
use crate::reconcile::{ProjectPlan, Reconciler};
use crate::secrets::{self, PodmanSecrets, SecretSource};
use crate::spec::convert::convert_project;
use crate::state::UnitStore;
use crate::systemd::Systemctl;
use crate::unit::UnitDirectory;

/// Arguments for the `sync` command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Directory tree containing compose projects
    pub path: PathBuf,

    /// Explicit project name (treats PATH as a single project)
    #[arg(long)]
    pub project_name: Option<String>,

    /// Environment override (KEY=VALUE)
    #[arg(short = 'e', long = "env", action = clap::ArgAction::Append, value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Additional env file, merged below the project `.env`
    #[arg(long = "env-file", action = clap::ArgAction::Append, value_name = "FILE")]
    pub env_files: Vec<PathBuf>,

    /// Rewrite and restart every unit regardless of content hashes
    #[arg(long)]
    pub force: bool,

    /// Report the plan without writing files or touching systemd
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the secret availability filter
    #[arg(long)]
    pub no_secret_filter: bool,
}

pub async fn execute(args: &SyncArgs, config: &Config) -> Result<()> {
    let cancel = CancelToken::new();
    cancel.hook_ctrl_c();

    let opts = LoadOptions {
        workdir: None,
        environment: parse_env_overrides(&args.env)?,
        env_files: args.env_files.clone(),
        project_name: args.project_name.clone(),
    };

    // An explicit name pins the path to a single project; otherwise the
    // whole tree is discovered
    let results = if args.project_name.is_some() {
        vec![LoadResult {
            path: args.path.clone(),
            result: compose::load(&cancel, &args.path, &opts),
        }]
    } else {
        compose::load_all(&cancel, &args.path, &opts)?
    };

    let available = if args.no_secret_filter {
        None
    } else {
        match PodmanSecrets::new().and_then(|source| source.list_available()) {
            Ok(set) => Some(set),
            Err(e) => {
                warn!("Secret availability unknown, filter disabled: {e}");
                None
            }
        }
    };

    let mut plans = Vec::new();
    let mut failed_projects = 0usize;
    for LoadResult { path, result } in results {
        let mut project = match result {
            Ok(project) => project,
            Err(e) if e.is_cancelled() => return Err(e.into()),
            Err(e) => {
                error!("{}: {e}", path.display());
                failed_projects += 1;
                continue;
            }
        };

        for dropped in secrets::filter_unavailable(&mut project, available.as_ref()) {
            info!(
                "{}: skipping service {} (missing secrets: {})",
                project.name,
                dropped.service,
                dropped.missing.join(", ")
            );
        }

        let plan = convert_project(&cancel, &project).and_then(|specs| {
            let graph = DependencyGraph::from_specs(&specs)?;
            Ok(ProjectPlan { specs, graph })
        });
        match plan {
            Ok(plan) => plans.push(plan),
            Err(e) if e.is_cancelled() => return Err(e.into()),
            Err(e) => {
                // A broken project never blocks the rest of the batch
                error!("{}: {e}", path.display());
                failed_projects += 1;
            }
        }
    }

    let units = UnitDirectory::new(&config.unit_dir);
    let store = UnitStore::open(&config.db_path).context("opening tracking database")?;

    let report = if args.dry_run {
        // A dry run never reaches systemd; don't require systemctl
        Reconciler::new(&units, &store, &NoopSystemd)
            .force(args.force)
            .dry_run(true)
            .reconcile(&cancel, &plans)
            .await?
    } else {
        let systemd = Systemctl::new(config.user).context("locating systemctl")?;
        Reconciler::new(&units, &store, &systemd)
            .force(args.force)
            .reconcile(&cancel, &plans)
            .await?
    };

    if args.dry_run {
        println!("Dry run: no files written, no units restarted.\n");
        print_list("Would write", &report.written);
        print_list("Would remove", &report.orphans_removed);
        println!("Unchanged: {}", report.unchanged);
    } else {
        print_list("Written", &report.written);
        print_list("Removed", &report.orphans_removed);
        print_list("Restarted", &report.restarted);
        println!("Unchanged: {}", report.unchanged);
        if !report.restart_failures.is_empty() {
            print_list("Failed to restart", &report.restart_failures);
        }
    }

    if failed_projects > 0 {
        bail!("{failed_projects} project(s) failed; see log for details");
    }
    Ok(())
}

struct NoopSystemd;

impl crate::systemd::SystemdManager for NoopSystemd {
    fn daemon_reload(&self) -> std::result::Result<(), crate::systemd::SystemdError> {
        Ok(())
    }
    fn start_unit(&self, _unit: &str) -> std::result::Result<(), crate::systemd::SystemdError> {
        Ok(())
    }
    fn stop_unit(&self, _unit: &str) -> std::result::Result<(), crate::systemd::SystemdError> {
        Ok(())
    }
    fn restart_unit(&self, _unit: &str) -> std::result::Result<(), crate::systemd::SystemdError> {
        Ok(())
    }
}

fn parse_env_overrides(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("--env '{pair}' is not KEY=VALUE"))?;
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}

fn print_list(label: &str, items: &[String]) {
    if items.is_empty() {
        println!("{label}: none");
    } else {
        println!("{label}: {}", items.len());
        for item in items {
            println!("  {item}");
        }
    }
}
