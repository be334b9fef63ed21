//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! systemd adapter driving transitions through systemctl

use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SystemdError {
    #[error("systemctl not found in PATH")]
    NotFound,
    #[error("systemctl {action} {unit} failed: {stderr}")]
    CommandFailed {
        action: String,
        unit: String,
        stderr: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The transitions the reconciler needs. Kept minimal so tests can swap
/// in a recording implementation and never touch the host.
pub trait SystemdManager {
    fn daemon_reload(&self) -> Result<(), SystemdError>;
    fn start_unit(&self, unit: &str) -> Result<(), SystemdError>;
    fn stop_unit(&self, unit: &str) -> Result<(), SystemdError>;
    fn restart_unit(&self, unit: &str) -> Result<(), SystemdError>;
}

/// Drives the host's systemd instance via the systemctl binary.
pub struct Systemctl {
    systemctl_path: PathBuf,
    user: bool,
}

impl Systemctl {
    pub fn new(user: bool) -> Result<Self, SystemdError> {
        let systemctl_path = which::which("systemctl").map_err(|_| SystemdError::NotFound)?;
        Ok(Self {
            systemctl_path,
            user,
        })
    }

    fn run(&self, action: &str, unit: Option<&str>) -> Result<(), SystemdError> {
        let mut cmd = Command::new(&self.systemctl_path);
        if self.user {
            cmd.arg("--user");
        }
        cmd.arg(action);
        if let Some(unit) = unit {
            cmd.arg(unit);
        }

        debug!("systemctl {action} {}", unit.unwrap_or(""));
        let output = cmd.output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SystemdError::CommandFailed {
                action: action.to_string(),
                unit: unit.unwrap_or("").to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl SystemdManager for Systemctl {
    fn daemon_reload(&self) -> Result<(), SystemdError> {
        self.run("daemon-reload", None)
    }

    fn start_unit(&self, unit: &str) -> Result<(), SystemdError> {
        self.run("start", Some(unit))
    }

    fn stop_unit(&self, unit: &str) -> Result<(), SystemdError> {
        self.run("stop", Some(unit))
    }

    fn restart_unit(&self, unit: &str) -> Result<(), SystemdError> {
        self.run("restart", Some(unit))
    }
}
