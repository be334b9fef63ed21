//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Structural validation and the quadlet-compatibility whitelist

use tracing::warn;

use crate::error::{Error, Result};
use crate::naming;

use super::model::{parse_duration, ServiceConfig};
use super::Project;

const RESTART_POLICIES: &[&str] = &["no", "always", "on-failure", "unless-stopped"];
const NETWORK_MODES: &[&str] = &["bridge", "host"];
const IPC_MODES: &[&str] = &["private", "shareable"];
const DEPENDS_CONDITIONS: &[&str] = &[
    "service_started",
    "service_healthy",
    "service_completed_successfully",
];
const LOG_DRIVERS: &[&str] = &["json-file", "journald"];
const STOP_SIGNALS: &[&str] = &["SIGTERM", "SIGKILL", "TERM", "KILL"];

/// Structural validation, applied after the project name is in place.
///
/// Typed deserialization already rejected malformed shapes; this pass
/// enforces the value constraints, keeping the offending field path in
/// every message.
pub fn validate_project(project: &Project) -> Result<()> {
    if !naming::is_valid_project_name(&project.name) {
        return Err(Error::Validation(format!(
            "invalid project name '{}'",
            project.name
        )));
    }

    for (name, service) in &project.services {
        if !naming::is_valid_service_name(name) {
            return Err(Error::Validation(format!(
                "services.{name}: invalid service name"
            )));
        }
        validate_service_values(name, service)?;
    }

    Ok(())
}

fn validate_service_values(name: &str, service: &ServiceConfig) -> Result<()> {
    if let Some(health) = &service.healthcheck {
        for (field, value) in [
            ("interval", &health.interval),
            ("timeout", &health.timeout),
            ("start_period", &health.start_period),
        ] {
            if let Some(value) = value {
                if parse_duration(value).is_none() {
                    return Err(Error::Validation(format!(
                        "services.{name}.healthcheck.{field}: invalid duration '{value}'"
                    )));
                }
            }
        }
        if let Some(retries) = health.retries {
            if retries < 0 {
                return Err(Error::Validation(format!(
                    "services.{name}.healthcheck.retries: must be non-negative"
                )));
            }
        }
    }

    if let Some(grace) = &service.stop_grace_period {
        if parse_duration(grace).is_none() {
            return Err(Error::Validation(format!(
                "services.{name}.stop_grace_period: invalid duration '{grace}'"
            )));
        }
    }

    for (field, value) in [("mem_limit", &service.mem_limit), ("shm_size", &service.shm_size)] {
        if let Some(value) = value {
            if value.as_bytes().is_none() {
                return Err(Error::Validation(format!(
                    "services.{name}.{field}: invalid size"
                )));
            }
        }
    }

    for (secret, env_var) in &service.podman_env_secrets {
        if !naming::is_valid_secret_name(secret) {
            return Err(Error::Validation(format!(
                "services.{name}.x-podman-env-secrets: invalid secret name '{secret}'"
            )));
        }
        if !naming::is_valid_secret_env_var(env_var) {
            return Err(Error::Validation(format!(
                "services.{name}.x-podman-env-secrets: invalid variable name '{env_var}'"
            )));
        }
    }

    for dep in &service.external_depends_on {
        if !naming::is_valid_project_name(&dep.project) {
            return Err(Error::Validation(format!(
                "services.{name}.x-quad-ops-depends-on: invalid project '{}'",
                dep.project
            )));
        }
        if !naming::is_valid_service_name(&dep.service) {
            return Err(Error::Validation(format!(
                "services.{name}.x-quad-ops-depends-on: invalid service '{}'",
                dep.service
            )));
        }
    }

    for (i, init) in service.init_containers.iter().enumerate() {
        if init.image.is_empty() {
            return Err(Error::Validation(format!(
                "services.{name}.x-quad-ops-init[{i}]: image is required"
            )));
        }
    }

    Ok(())
}

/// Enforce the intersection of compose semantics with what quadlet units
/// can express. Anything outside the whitelist is fatal.
pub fn validate_quadlet_compat(project: &Project) -> Result<()> {
    for (name, service) in &project.services {
        validate_service_compat(name, service)?;
    }

    for (name, volume) in project.local_volumes() {
        if let Some(driver) = &volume.driver {
            if driver != "local" {
                return Err(Error::QuadletCompat(format!(
                    "volumes.{name}.driver: '{driver}' has no quadlet mapping (only 'local')"
                )));
            }
        }
    }

    for (name, network) in project.local_networks() {
        if let Some(driver) = &network.driver {
            if driver != "bridge" {
                return Err(Error::QuadletCompat(format!(
                    "networks.{name}.driver: '{driver}' has no quadlet mapping (only 'bridge')"
                )));
            }
        }
    }

    for (name, config) in &project.configs {
        if config.driver.is_some() || !config.driver_opts.is_empty() {
            return Err(Error::QuadletCompat(format!(
                "configs.{name}: swarm-only driver fields are not supported"
            )));
        }
    }
    for (name, secret) in &project.secrets {
        if secret.driver.is_some() || !secret.driver_opts.is_empty() {
            return Err(Error::QuadletCompat(format!(
                "secrets.{name}: swarm-only driver fields are not supported"
            )));
        }
    }

    Ok(())
}

fn validate_service_compat(name: &str, service: &ServiceConfig) -> Result<()> {
    let has_dockerfile = service
        .build
        .as_ref()
        .is_some_and(|b| b.dockerfile().is_some());
    if service.image.is_none() && !has_dockerfile {
        return Err(Error::QuadletCompat(format!(
            "services.{name}: needs an image or a build with an explicit dockerfile"
        )));
    }

    if let Some(restart) = &service.restart {
        if !RESTART_POLICIES.contains(&restart.as_str()) {
            return Err(Error::QuadletCompat(format!(
                "services.{name}.restart: '{restart}' is not one of {RESTART_POLICIES:?}"
            )));
        }
    }

    if let Some(mode) = &service.network_mode {
        if !NETWORK_MODES.contains(&mode.as_str()) {
            return Err(Error::QuadletCompat(format!(
                "services.{name}.network_mode: '{mode}' has no quadlet mapping"
            )));
        }
        if mode == "host" && !service.ports.is_empty() {
            return Err(Error::QuadletCompat(format!(
                "services.{name}: host network mode forbids port publishing"
            )));
        }
    }

    if let Some(ipc) = &service.ipc {
        if !IPC_MODES.contains(&ipc.as_str()) {
            return Err(Error::QuadletCompat(format!(
                "services.{name}.ipc: '{ipc}' has no quadlet mapping"
            )));
        }
    }

    if let Some(depends) = &service.depends_on {
        for (dep, condition) in depends.entries() {
            if let Some(condition) = condition {
                if !DEPENDS_CONDITIONS.contains(&condition.as_str()) {
                    return Err(Error::QuadletCompat(format!(
                        "services.{name}.depends_on.{dep}.condition: '{condition}' is not supported"
                    )));
                }
            }
        }
    }

    if let Some(logging) = &service.logging {
        if let Some(driver) = &logging.driver {
            if !LOG_DRIVERS.contains(&driver.as_str()) {
                return Err(Error::QuadletCompat(format!(
                    "services.{name}.logging.driver: '{driver}' is not supported"
                )));
            }
        }
    }

    if let Some(signal) = &service.stop_signal {
        if !STOP_SIGNALS.contains(&signal.as_str()) {
            return Err(Error::QuadletCompat(format!(
                "services.{name}.stop_signal: '{signal}' is not supported"
            )));
        }
    }

    for opt in &service.security_opt {
        if !is_mappable_security_opt(opt) {
            return Err(Error::QuadletCompat(format!(
                "services.{name}.security_opt: '{opt}' has no quadlet mapping"
            )));
        }
    }

    if service.user.is_some() {
        return Err(Error::QuadletCompat(format!(
            "services.{name}.user: not supported for rootless quadlet units"
        )));
    }
    if service.tmpfs.is_some() {
        return Err(Error::QuadletCompat(format!(
            "services.{name}.tmpfs: use a tmpfs volume mount instead"
        )));
    }
    if !service.profiles.is_empty() {
        return Err(Error::QuadletCompat(format!(
            "services.{name}.profiles: profiles are not supported"
        )));
    }

    if let Some(deploy) = &service.deploy {
        if deploy.replicas.is_some_and(|r| r > 1) {
            return Err(Error::QuadletCompat(format!(
                "services.{name}.deploy.replicas: more than one replica is not supported"
            )));
        }
        if let Some(placement) = &deploy.placement {
            if !placement.constraints.is_empty() {
                return Err(Error::QuadletCompat(format!(
                    "services.{name}.deploy.placement.constraints: not supported"
                )));
            }
            if !placement.preferences.is_empty() {
                return Err(Error::QuadletCompat(format!(
                    "services.{name}.deploy.placement.preferences: not supported"
                )));
            }
        }
    }

    if service.privileged {
        // Passes through unchanged; leave a trace for security review.
        warn!("services.{name}: privileged mode requested, passing through");
    }

    Ok(())
}

/// `security_opt` values with a quadlet rendering.
fn is_mappable_security_opt(opt: &str) -> bool {
    if opt == "no-new-privileges" || opt == "no-new-privileges:true" {
        return true;
    }
    if opt.starts_with("seccomp=") || opt.starts_with("mask=") || opt.starts_with("unmask=") {
        return true;
    }
    if let Some(label) = opt.strip_prefix("label=") {
        return label == "disable"
            || label == "nested"
            || label.starts_with("type:")
            || label.starts_with("level:")
            || label.starts_with("filetype:");
    }
    false
}
