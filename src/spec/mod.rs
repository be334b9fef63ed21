//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Canonical service specification model
//!
//! The converter normalizes every compose resource into a [`Spec`]; the
//! renderer and reconciler consume nothing else. A Spec is immutable once
//! it has passed [`Spec::validate`] and does not outlive its pass.

pub mod convert;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::naming;
use crate::unit::UnitKind;

/// One unit-producing resource with project-scoped naming.
#[derive(Debug, Clone)]
pub struct Spec {
    /// Prefixed name, unique within the project's Spec set.
    pub name: String,
    /// Owning project; restart ordering partitions on this.
    pub project: String,
    pub resource: Resource,
    /// Same-project dependencies, sorted by name.
    pub depends_on: Vec<UnitRef>,
    /// Cross-project dependencies, carried through unresolved.
    pub external_dependencies: Vec<ExternalDependency>,
    /// Free-form annotations rendered onto the unit.
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum Resource {
    Container(ContainerSpec),
    Volume(VolumeSpec),
    Network(NetworkSpec),
    Build(BuildSpec),
}

impl Spec {
    pub fn kind(&self) -> UnitKind {
        match &self.resource {
            Resource::Container(_) => UnitKind::Container,
            Resource::Volume(_) => UnitKind::Volume,
            Resource::Network(_) => UnitKind::Network,
            Resource::Build(_) => UnitKind::Build,
        }
    }

    pub fn as_container(&self) -> Option<&ContainerSpec> {
        match &self.resource {
            Resource::Container(c) => Some(c),
            _ => None,
        }
    }

    /// Validate the finished Spec; nothing invalid leaves the converter.
    pub fn validate(&self) -> Result<()> {
        if !naming::is_valid_service_name(&self.name) {
            return Err(Error::Validation(format!("spec name '{}' is invalid", self.name)));
        }

        for dep in &self.depends_on {
            if dep.name.is_empty() {
                return Err(Error::Validation(format!(
                    "spec {}: empty dependency name",
                    self.name
                )));
            }
        }

        if let Resource::Container(container) = &self.resource {
            self.validate_container(container)?;
        }
        if let Resource::Build(build) = &self.resource {
            if build.context.is_empty() {
                return Err(Error::Validation(format!(
                    "spec {}: build context is empty",
                    self.name
                )));
            }
        }

        Ok(())
    }

    fn validate_container(&self, container: &ContainerSpec) -> Result<()> {
        if container.image.is_none() && container.build.is_none() {
            return Err(Error::Validation(format!(
                "spec {}: container has neither image nor build",
                self.name
            )));
        }

        for port in &container.ports {
            if port.container == 0 {
                return Err(Error::Validation(format!(
                    "spec {}: container port must be in 1..65535",
                    self.name
                )));
            }
            if port.host_port == Some(0) {
                return Err(Error::Validation(format!(
                    "spec {}: host port must be in 1..65535",
                    self.name
                )));
            }
        }

        if let Some(health) = &container.healthcheck {
            if health.retries < 0 {
                return Err(Error::Validation(format!(
                    "spec {}: healthcheck retries must be non-negative",
                    self.name
                )));
            }
        }

        if let Some(signal) = &container.stop_signal {
            const SIGNALS: &[&str] = &["SIGTERM", "SIGKILL", "TERM", "KILL"];
            if !SIGNALS.contains(&signal.as_str()) {
                return Err(Error::Validation(format!(
                    "spec {}: stop signal '{signal}' out of range",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

/// Reference to another Spec, with enough type information to derive the
/// systemd service name at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRef {
    pub name: String,
    pub kind: UnitKind,
}

/// A dependency on a service owned by a different project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalDependency {
    pub project: String,
    pub service: String,
    pub optional: bool,
}

impl ExternalDependency {
    /// Service unit of the dependency in the foreign project's namespace.
    pub fn service_unit(&self) -> String {
        UnitKind::Container.service_name(&naming::prefix(&self.project, &self.service))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    #[default]
    No,
    Always,
    OnFailure,
    UnlessStopped,
}

impl RestartPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no" => Some(RestartPolicy::No),
            "always" => Some(RestartPolicy::Always),
            "on-failure" => Some(RestartPolicy::OnFailure),
            "unless-stopped" => Some(RestartPolicy::UnlessStopped),
            _ => None,
        }
    }

    /// Value for the unit's `[Service] Restart=` line. systemd has no
    /// unless-stopped; always is the closest faithful mapping.
    pub fn systemd_value(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always | RestartPolicy::UnlessStopped => "always",
            RestartPolicy::OnFailure => "on-failure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    Bridge,
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcMode {
    Private,
    Shareable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDriver {
    JsonFile,
    Journald,
}

impl LogDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogDriver::JsonFile => "json-file",
            LogDriver::Journald => "journald",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// Host interface to bind, when restricted.
    pub host: Option<String>,
    pub host_port: Option<u16>,
    pub container: u16,
    pub protocol: Protocol,
}

/// A mount, fully resolved: named-volume sources already carry the
/// project prefix, external sources are verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSpec {
    Bind {
        source: String,
        target: String,
        read_only: bool,
    },
    Volume {
        source: String,
        target: String,
        read_only: bool,
        /// Whether a `.volume` unit backs this source (false for
        /// external and undeclared volumes).
        has_unit: bool,
    },
    Tmpfs {
        target: String,
        size: Option<u64>,
        mode: Option<String>,
    },
}

/// A network attachment; external networks keep their original name and
/// never reference a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRef {
    pub name: String,
    pub external: bool,
    /// Whether a `.network` unit backs this attachment.
    pub has_unit: bool,
}

#[derive(Debug, Clone)]
pub struct HealthcheckSpec {
    pub test: Vec<String>,
    pub interval: Option<Duration>,
    pub timeout: Option<Duration>,
    pub retries: i32,
    pub start_period: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct LoggingSpec {
    pub driver: LogDriver,
    pub options: BTreeMap<String, String>,
}

/// Parsed `security_opt` values.
#[derive(Debug, Clone, Default)]
pub struct SecuritySpec {
    pub seccomp_profile: Option<String>,
    pub apparmor_profile: Option<String>,
    pub selinux_type: Option<String>,
    pub selinux_level: Option<String>,
    pub selinux_filetype: Option<String>,
    pub label_disable: bool,
    pub label_nested: bool,
    pub no_new_privileges: bool,
    pub mask: Vec<String>,
    pub unmask: Vec<String>,
    /// Anything mappable that has no dedicated field.
    pub other: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: Option<String>,
    /// Name of the build Spec that produces the image.
    pub build: Option<String>,
    pub command: Vec<String>,
    pub entrypoint: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub env_files: Vec<PathBuf>,
    pub ports: Vec<PortSpec>,
    pub mounts: Vec<MountSpec>,
    pub networks: Vec<NetworkRef>,
    pub network_mode: Option<NetworkMode>,
    pub ipc: Option<IpcMode>,
    pub restart: RestartPolicy,
    pub healthcheck: Option<HealthcheckSpec>,
    pub logging: Option<LoggingSpec>,
    pub stop_signal: Option<String>,
    pub stop_timeout: Option<u64>,
    pub security: SecuritySpec,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub privileged: bool,
    pub memory_limit: Option<u64>,
    /// CPU quota in µs against the fixed period in
    /// [`convert::CPU_PERIOD_US`].
    pub cpu_quota: Option<u64>,
    pub shm_size: Option<u64>,
    /// secret name → environment variable
    pub env_secrets: BTreeMap<String, String>,
    /// Secrets mounted as files.
    pub secrets: Vec<String>,
    pub labels: BTreeMap<String, String>,
    /// Init containers run to completion before dependents start.
    pub one_shot: bool,
}

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            image: None,
            build: None,
            command: Vec::new(),
            entrypoint: Vec::new(),
            env: BTreeMap::new(),
            env_files: Vec::new(),
            ports: Vec::new(),
            mounts: Vec::new(),
            networks: Vec::new(),
            network_mode: None,
            ipc: None,
            restart: RestartPolicy::default(),
            healthcheck: None,
            logging: None,
            stop_signal: None,
            stop_timeout: None,
            security: SecuritySpec::default(),
            cap_add: Vec::new(),
            cap_drop: Vec::new(),
            privileged: false,
            memory_limit: None,
            cpu_quota: None,
            shm_size: None,
            env_secrets: BTreeMap::new(),
            secrets: Vec::new(),
            labels: BTreeMap::new(),
            one_shot: false,
        }
    }
}

impl ContainerSpec {
    /// Named volumes actually mounted by this container, sorted.
    pub fn mounted_volumes(&self) -> Vec<&str> {
        let mut volumes: Vec<&str> = self
            .mounts
            .iter()
            .filter_map(|m| match m {
                MountSpec::Volume { source, .. } => Some(source.as_str()),
                _ => None,
            })
            .collect();
        volumes.sort_unstable();
        volumes
    }

    /// Attached network names, sorted.
    pub fn network_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.networks.iter().map(|n| n.name.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone, Default)]
pub struct VolumeSpec {
    pub driver: Option<String>,
    pub options: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkSpec {
    pub driver: Option<String>,
    pub options: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct BuildSpec {
    pub context: String,
    pub dockerfile: String,
    pub args: BTreeMap<String, String>,
    /// Tag the built image is published under.
    pub image_tag: String,
}
