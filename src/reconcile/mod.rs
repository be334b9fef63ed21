//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Reconciliation: write changed units, sweep orphans, restart in order
//!
//! The pass is strictly sequential: every write happens before any
//! orphan cleanup, and every cleanup happens before any restart. Only
//! units whose rendered content changed are restarted, dependents-first
//! on the way down and dependencies-first on the way up.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::spec::Spec;
use crate::state::{TrackedUnit, UnitStore};
use crate::systemd::SystemdManager;
use crate::unit::{self, render::render, UnitDirectory, UnitKind};

/// Pause between orphan cleanup and the restart phase. Restarting while
/// systemd is still digesting unit removals races and fails; this delay
/// is part of the contract, not tuning.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// One project's converted Specs with their dependency graph.
pub struct ProjectPlan {
    pub specs: Vec<Spec>,
    pub graph: DependencyGraph,
}

/// What a pass did, for logging and the CLI summary.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Unit files written (or, in dry-run, that would be written).
    pub written: Vec<String>,
    pub unchanged: usize,
    /// Orphaned units removed (or, in dry-run, that would be removed).
    pub orphans_removed: Vec<String>,
    /// Services restarted, in transition order.
    pub restarted: Vec<String>,
    /// Services whose transition failed; the pass continued past them.
    pub restart_failures: Vec<String>,
}

pub struct Reconciler<'a, S: SystemdManager> {
    units: &'a UnitDirectory,
    store: &'a UnitStore,
    systemd: &'a S,
    force: bool,
    dry_run: bool,
}

impl<'a, S: SystemdManager> Reconciler<'a, S> {
    pub fn new(units: &'a UnitDirectory, store: &'a UnitStore, systemd: &'a S) -> Self {
        Self {
            units,
            store,
            systemd,
            force: false,
            dry_run: false,
        }
    }

    /// Mark every unit changed regardless of content hashes.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Compute the plan but write nothing and touch no systemd state.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run one full pass over the given projects.
    pub async fn reconcile(
        &self,
        cancel: &CancelToken,
        plans: &[ProjectPlan],
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let tracked = self.store.find_all()?;

        // Phase 1: render, detect changes, write
        let mut processed: BTreeSet<(String, UnitKind)> = BTreeSet::new();
        let mut changed: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();

        for plan in plans {
            for spec in &plan.specs {
                cancel.check()?;

                let kind = spec.kind();
                let text = render(spec);
                let hash = unit::content_hash(&text);
                let record = self.store.find(&spec.name, kind)?;
                processed.insert((spec.name.clone(), kind));

                let needs_write = self.force
                    || record.as_ref().map(|r| r.content_hash != hash).unwrap_or(true)
                    || has_naming_conflict(&tracked, &spec.name, kind);

                if needs_write {
                    if !self.dry_run {
                        self.units.write(&spec.name, kind, &text).map_err(|source| {
                            Error::Write {
                                name: spec.name.clone(),
                                source,
                            }
                        })?;
                        self.store.upsert(&spec.name, kind, &hash)?;
                    }
                    info!("Updated {}", unit::file_name(&spec.name, kind));
                    report.written.push(unit::file_name(&spec.name, kind));
                    changed
                        .entry(spec.project.as_str())
                        .or_default()
                        .insert(spec.name.clone());
                } else {
                    if !self.dry_run {
                        // Liveness only; the hash stays as-is
                        self.store.touch(record.as_ref().unwrap().id)?;
                    }
                    debug!("Unchanged {}", unit::file_name(&spec.name, kind));
                    report.unchanged += 1;
                }
            }
        }

        // Phase 2: orphan sweep
        for record in self.store.find_all()? {
            if processed.contains(&(record.name.clone(), record.kind)) {
                continue;
            }
            report
                .orphans_removed
                .push(unit::file_name(&record.name, record.kind));
            if self.dry_run {
                continue;
            }

            info!("Removing orphaned {}", unit::file_name(&record.name, record.kind));
            let service = record.kind.service_name(&record.name);
            if let Err(e) = self.systemd.stop_unit(&service) {
                warn!("Could not stop orphan {service}: {e}");
            }
            if let Err(e) = self.units.remove(&record.name, record.kind) {
                warn!("Could not remove {}: {e}", unit::file_name(&record.name, record.kind));
            }
            if let Err(e) = self.store.delete(record.id) {
                warn!("Could not delete record for {}: {e}", record.name);
            }
        }

        if self.dry_run {
            return Ok(report);
        }

        let any_transition = !report.written.is_empty() || !report.orphans_removed.is_empty();
        if any_transition {
            if let Err(e) = self.systemd.daemon_reload() {
                warn!("daemon-reload failed: {e}");
            }
            // Let systemd settle before driving restarts
            tokio::time::sleep(SETTLE_DELAY).await;
        }

        // Phase 3: restart changed units, per project, in graph order
        for plan in plans {
            let Some(project) = plan.specs.first().map(|s| s.project.as_str()) else {
                continue;
            };
            let Some(project_changed) = changed.get(project) else {
                continue;
            };
            cancel.check()?;

            for name in plan.graph.reverse_topo_order() {
                if !project_changed.contains(&name) {
                    continue;
                }
                let kind = plan.graph.kind_of(&name).unwrap_or(UnitKind::Container);
                let service = kind.service_name(&name);
                if let Err(e) = self.systemd.stop_unit(&service) {
                    debug!("Stop of {service} failed (may not be running): {e}");
                }
            }

            for name in plan.graph.topo_order() {
                if !project_changed.contains(&name) {
                    continue;
                }
                let kind = plan.graph.kind_of(&name).unwrap_or(UnitKind::Container);
                let service = kind.service_name(&name);
                match self.systemd.start_unit(&service) {
                    Ok(()) => {
                        info!("Started {service}");
                        report.restarted.push(service);
                    }
                    Err(e) => {
                        let err = Error::Restart {
                            unit: service.clone(),
                            message: e.to_string(),
                        };
                        warn!("{err}");
                        report.restart_failures.push(service);
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Detect a naming-scheme migration: a tracked unit of the same kind
/// whose name is a proper suffix of the target, or vice versa. Forces a
/// rewrite and restart so renamed trees converge.
fn has_naming_conflict(tracked: &[TrackedUnit], name: &str, kind: UnitKind) -> bool {
    tracked.iter().any(|t| {
        t.kind == kind && t.name != name && (t.name.ends_with(name) || name.ends_with(&t.name))
    })
}
