//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Secret availability filtering
//!
//! Services whose declared env secrets are missing from the runtime are
//! dropped before reconciliation instead of producing units that can
//! never start.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Command;
use tracing::warn;

use crate::compose::Project;

/// Source of the runtime's known secret names.
pub trait SecretSource {
    fn list_available(&self) -> std::io::Result<BTreeSet<String>>;
}

/// Queries podman for its secret store.
pub struct PodmanSecrets {
    podman_path: PathBuf,
}

impl PodmanSecrets {
    pub fn new() -> std::io::Result<Self> {
        let podman_path = which::which("podman")
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e))?;
        Ok(Self { podman_path })
    }
}

impl SecretSource for PodmanSecrets {
    fn list_available(&self) -> std::io::Result<BTreeSet<String>> {
        let output = Command::new(&self.podman_path)
            .args(["secret", "ls", "--format", "{{.Name}}"])
            .output()?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "podman secret ls failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// A service removed because its secrets are not available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedService {
    pub service: String,
    pub missing: Vec<String>,
}

/// Drop services whose `x-podman-env-secrets` reference absent secrets.
///
/// Mutates the project's service map in place and reports what was
/// removed. Without an availability set this is a no-op.
pub fn filter_unavailable(
    project: &mut Project,
    available: Option<&BTreeSet<String>>,
) -> Vec<DroppedService> {
    let Some(available) = available else {
        return Vec::new();
    };

    let mut dropped = Vec::new();
    project.services.retain(|name, service| {
        let missing: Vec<String> = service
            .podman_env_secrets
            .keys()
            .filter(|secret| !available.contains(*secret))
            .cloned()
            .collect();
        if missing.is_empty() {
            true
        } else {
            warn!(
                "Dropping service {}/{name}: missing secrets {missing:?}",
                project.name
            );
            dropped.push(DroppedService {
                service: name.clone(),
                missing,
            });
            false
        }
    });
    dropped
}
