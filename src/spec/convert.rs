//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Compose project → canonical Spec normalization

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::cancel::CancelToken;
use crate::compose::model::{
    HealthcheckConfig, PortConfig, ServiceConfig, StringOrList, VolumeMountConfig,
};
use crate::compose::Project;
use crate::error::{Error, Result};
use crate::naming::{self, SEP};
use crate::unit::UnitKind;

use super::{
    BuildSpec, ContainerSpec, ExternalDependency, HealthcheckSpec, IpcMode, LogDriver,
    LoggingSpec, MountSpec, NetworkMode, NetworkRef, NetworkSpec, PortSpec, Protocol,
    Resource, RestartPolicy, SecuritySpec, Spec, UnitRef, VolumeSpec,
};

/// Fixed CPU accounting period; quotas are computed against it.
pub const CPU_PERIOD_US: u64 = 100_000;

/// Probed relative to the service's working directory; hits are appended
/// to the container's env-file list.
const ENV_FILE_PROBES: &[&str] = &[".env", ".env.{}", "{}.env", "env/{}.env", "envs/{}.env"];

/// Normalize every resource of a project into validated Specs.
///
/// Emits one Spec per service container, per init container, per build,
/// and per local named volume and network. External resources contribute
/// no Specs of their own.
pub fn convert_project(cancel: &CancelToken, project: &Project) -> Result<Vec<Spec>> {
    let mut specs = Vec::new();

    for (service_name, service) in &project.services {
        cancel.check()?;
        specs.extend(convert_service(project, service_name, service)?);
    }

    for (volume_name, volume) in project.local_volumes() {
        specs.push(Spec {
            name: naming::prefix(&project.name, volume_name),
            project: project.name.clone(),
            resource: Resource::Volume(VolumeSpec {
                driver: volume.driver.clone(),
                options: volume.driver_opts.clone(),
                labels: volume.labels.as_ref().map(|l| l.to_map()).unwrap_or_default(),
            }),
            depends_on: Vec::new(),
            external_dependencies: Vec::new(),
            annotations: BTreeMap::new(),
        });
    }

    for (network_name, network) in project.local_networks() {
        specs.push(Spec {
            name: naming::prefix(&project.name, network_name),
            project: project.name.clone(),
            resource: Resource::Network(NetworkSpec {
                driver: network.driver.clone(),
                options: network.driver_opts.clone(),
                labels: network.labels.as_ref().map(|l| l.to_map()).unwrap_or_default(),
            }),
            depends_on: Vec::new(),
            external_dependencies: Vec::new(),
            annotations: BTreeMap::new(),
        });
    }

    let mut seen = BTreeSet::new();
    for spec in &specs {
        if !seen.insert(spec.name.clone()) {
            return Err(Error::Validation(format!(
                "duplicate resource name '{}' in project '{}'",
                spec.name, project.name
            )));
        }
    }

    for spec in &specs {
        spec.validate()?;
    }

    Ok(specs)
}

/// Convert one service into its build, init, and container Specs.
fn convert_service(
    project: &Project,
    service_name: &str,
    service: &ServiceConfig,
) -> Result<Vec<Spec>> {
    let prefixed = naming::prefix(&project.name, service_name);
    let mut out = Vec::new();
    let mut depends: Vec<UnitRef> = Vec::new();

    let build_name = match &service.build {
        Some(build) => {
            let name = format!("{prefixed}{SEP}build");
            let mut args = build.args();
            // Extension args override compose args
            for (key, value) in &service.podman_buildargs {
                args.insert(key.clone(), value.clone());
            }
            out.push(Spec {
                name: name.clone(),
                project: project.name.clone(),
                resource: Resource::Build(BuildSpec {
                    context: build.context().unwrap_or(".").to_string(),
                    dockerfile: build.dockerfile().unwrap_or("Dockerfile").to_string(),
                    args,
                    image_tag: format!("localhost/{prefixed}:latest"),
                }),
                depends_on: Vec::new(),
                external_dependencies: Vec::new(),
                annotations: BTreeMap::new(),
            });
            depends.push(UnitRef {
                name: name.clone(),
                kind: UnitKind::Build,
            });
            Some(name)
        }
        None => None,
    };

    if let Some(dep_cfg) = &service.depends_on {
        // Conditions all collapse onto After=/Requires= at render time;
        // unknown ones behave as service_started.
        for (dep, _condition) in dep_cfg.entries() {
            depends.push(UnitRef {
                name: naming::prefix(&project.name, &dep),
                kind: UnitKind::Container,
            });
        }
    }

    let env = service
        .environment
        .as_ref()
        .map(|e| e.to_map())
        .unwrap_or_default();
    let env_files = collect_env_files(project, service_name, service);

    let mut mounts = Vec::new();
    for mount in &service.volumes {
        mounts.push(convert_mount(project, service_name, mount)?);
    }
    for extra in &service.podman_volumes {
        mounts.push(parse_short_mount(project, service_name, extra)?);
    }

    let networks = match &service.networks {
        Some(cfg) => {
            let mut refs: Vec<NetworkRef> = cfg
                .names()
                .iter()
                .map(|name| resolve_network_ref(project, name))
                .collect();
            refs.sort_by(|a, b| a.name.cmp(&b.name));
            refs
        }
        None => default_networks(project),
    };

    let ports = service
        .ports
        .iter()
        .map(|p| convert_port(service_name, p))
        .collect::<Result<Vec<_>>>()?;

    for (i, init) in service.init_containers.iter().enumerate() {
        let init_name = format!("{prefixed}{SEP}init{SEP}{i}");
        let init_env = init
            .environment
            .as_ref()
            .map(|e| e.to_map())
            .unwrap_or_else(|| env.clone());
        let init_mounts = if init.volumes.is_empty() {
            mounts.clone()
        } else {
            init.volumes
                .iter()
                .map(|v| parse_short_mount(project, service_name, v))
                .collect::<Result<Vec<_>>>()?
        };

        out.push(Spec {
            name: init_name.clone(),
            project: project.name.clone(),
            resource: Resource::Container(ContainerSpec {
                image: Some(init.image.clone()),
                command: init.command.as_ref().map(StringOrList::to_vec).unwrap_or_default(),
                env: init_env,
                env_files: env_files.clone(),
                mounts: init_mounts,
                networks: networks.clone(),
                one_shot: true,
                ..Default::default()
            }),
            depends_on: Vec::new(),
            external_dependencies: Vec::new(),
            annotations: BTreeMap::new(),
        });
        depends.push(UnitRef {
            name: init_name,
            kind: UnitKind::Container,
        });
    }

    let mut cap_add = service.cap_add.clone();
    cap_add.sort_unstable();
    let mut cap_drop = service.cap_drop.clone();
    cap_drop.sort_unstable();

    let mut secrets: Vec<String> = service.secrets.iter().map(|s| s.to_secret_arg()).collect();
    secrets.sort_unstable();

    let memory_limit = service
        .mem_limit
        .as_ref()
        .and_then(|m| m.as_bytes())
        .or_else(|| deploy_memory(service));

    let container = ContainerSpec {
        image: service.image.clone(),
        build: build_name,
        command: service.command.as_ref().map(StringOrList::to_vec).unwrap_or_default(),
        entrypoint: service
            .entrypoint
            .as_ref()
            .map(StringOrList::to_vec)
            .unwrap_or_default(),
        env,
        env_files,
        ports,
        mounts,
        networks,
        network_mode: match service.network_mode.as_deref() {
            Some("bridge") => Some(NetworkMode::Bridge),
            Some("host") => Some(NetworkMode::Host),
            _ => None,
        },
        ipc: match service.ipc.as_deref() {
            Some("private") => Some(IpcMode::Private),
            Some("shareable") => Some(IpcMode::Shareable),
            _ => None,
        },
        restart: service
            .restart
            .as_deref()
            .and_then(RestartPolicy::parse)
            .unwrap_or_default(),
        healthcheck: service.healthcheck.as_ref().and_then(convert_healthcheck),
        logging: service.logging.as_ref().and_then(|l| {
            let driver = match l.driver.as_deref() {
                Some("json-file") => LogDriver::JsonFile,
                Some("journald") => LogDriver::Journald,
                _ => return None,
            };
            Some(LoggingSpec {
                driver,
                options: l.options.clone(),
            })
        }),
        stop_signal: service.stop_signal.clone(),
        stop_timeout: service
            .stop_grace_period
            .as_deref()
            .and_then(crate::compose::model::parse_duration)
            .map(|d| d.as_secs()),
        security: parse_security_opts(&service.security_opt),
        cap_add,
        cap_drop,
        privileged: service.privileged,
        memory_limit,
        cpu_quota: cpu_quota(service),
        shm_size: service.shm_size.as_ref().and_then(|m| m.as_bytes()),
        env_secrets: service.podman_env_secrets.clone(),
        secrets,
        labels: service.labels.as_ref().map(|l| l.to_map()).unwrap_or_default(),
        one_shot: false,
    };

    depends.sort_by(|a, b| a.name.cmp(&b.name));
    depends.dedup();

    out.push(Spec {
        name: prefixed,
        project: project.name.clone(),
        resource: Resource::Container(container),
        depends_on: depends,
        external_dependencies: service
            .external_depends_on
            .iter()
            .map(|d| ExternalDependency {
                project: d.project.clone(),
                service: d.service.clone(),
                optional: d.optional,
            })
            .collect(),
        annotations: service
            .annotations
            .as_ref()
            .map(|a| a.to_map())
            .unwrap_or_default(),
    });

    Ok(out)
}

fn deploy_memory(service: &ServiceConfig) -> Option<u64> {
    service
        .deploy
        .as_ref()?
        .resources
        .as_ref()?
        .limits
        .as_ref()?
        .memory
        .as_ref()?
        .as_bytes()
}

fn cpu_quota(service: &ServiceConfig) -> Option<u64> {
    let cpus = service.cpus.or_else(|| {
        service
            .deploy
            .as_ref()?
            .resources
            .as_ref()?
            .limits
            .as_ref()?
            .cpus
            .as_ref()?
            .as_f64()
    })?;
    if cpus <= 0.0 {
        return None;
    }
    let nano_cpus = (cpus * 1_000_000_000.0) as u64;
    Some(nano_cpus * CPU_PERIOD_US / 1_000_000_000)
}

/// Probe the service's working directory for conventional env files; the
/// hits are appended after any explicitly listed files, sorted.
fn collect_env_files(project: &Project, service_name: &str, service: &ServiceConfig) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = service
        .env_file
        .as_ref()
        .map(StringOrList::to_vec)
        .unwrap_or_default()
        .into_iter()
        .map(|f| resolve_path(&project.working_dir, &f))
        .collect();

    let mut discovered: Vec<PathBuf> = ENV_FILE_PROBES
        .iter()
        .map(|probe| project.working_dir.join(probe.replace("{}", service_name)))
        .filter(|p| p.is_file())
        .collect();
    discovered.sort();

    for path in discovered {
        if !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let p = PathBuf::from(path);
    if p.is_absolute() {
        p
    } else {
        base.join(p)
    }
}

fn convert_port(service_name: &str, port: &PortConfig) -> Result<PortSpec> {
    match port {
        PortConfig::Number(n) => Ok(PortSpec {
            host: None,
            host_port: None,
            container: clamp_port(*n),
            protocol: Protocol::Tcp,
        }),
        PortConfig::Short(s) => parse_short_port(service_name, s),
        PortConfig::Long(long) => Ok(PortSpec {
            host: long.host_ip.clone(),
            host_port: long
                .published
                .as_ref()
                .and_then(|p| p.as_u32())
                .map(clamp_port),
            container: clamp_port(long.target),
            protocol: parse_protocol(service_name, long.protocol.as_deref())?,
        }),
    }
}

/// `[host_ip:][published:]target[/protocol]`
fn parse_short_port(service_name: &str, input: &str) -> Result<PortSpec> {
    let (ports, protocol) = match input.split_once('/') {
        Some((ports, proto)) => (ports, Some(proto)),
        None => (input, None),
    };
    let protocol = parse_protocol(service_name, protocol)?;

    let parse = |s: &str| -> Result<u32> {
        s.parse::<u32>().map_err(|_| {
            Error::Validation(format!(
                "services.{service_name}.ports: invalid port '{input}'"
            ))
        })
    };

    let parts: Vec<&str> = ports.split(':').collect();
    let (host, published, target) = match parts.as_slice() {
        [target] => (None, None, *target),
        [published, target] => (None, Some(*published), *target),
        [host, published, target] => (Some(*host), Some(*published), *target),
        _ => {
            return Err(Error::Validation(format!(
                "services.{service_name}.ports: invalid port '{input}'"
            )))
        }
    };

    let host_port = match published {
        Some("") | None => None,
        Some(p) => Some(clamp_port(parse(p)?)),
    };

    Ok(PortSpec {
        host: host.map(str::to_string),
        host_port,
        container: clamp_port(parse(target)?),
        protocol,
    })
}

/// Ports beyond the range clamp to 65535 instead of overflowing.
fn clamp_port(port: u32) -> u16 {
    port.min(u16::MAX as u32) as u16
}

fn parse_protocol(service_name: &str, proto: Option<&str>) -> Result<Protocol> {
    match proto {
        None | Some("tcp") => Ok(Protocol::Tcp),
        Some("udp") => Ok(Protocol::Udp),
        Some(other) => Err(Error::Validation(format!(
            "services.{service_name}.ports: unknown protocol '{other}'"
        ))),
    }
}

fn convert_mount(
    project: &Project,
    service_name: &str,
    mount: &VolumeMountConfig,
) -> Result<MountSpec> {
    match mount {
        VolumeMountConfig::Short(s) => parse_short_mount(project, service_name, s),
        VolumeMountConfig::Long(long) => {
            let kind = long.kind.as_deref();
            match kind {
                Some("tmpfs") => Ok(MountSpec::Tmpfs {
                    target: long.target.clone(),
                    size: long
                        .tmpfs
                        .as_ref()
                        .and_then(|t| t.size.as_ref())
                        .and_then(|s| s.as_bytes()),
                    mode: long.tmpfs.as_ref().and_then(|t| t.mode.clone()),
                }),
                Some("bind") => {
                    let source = require_source(service_name, long.source.as_deref())?;
                    Ok(MountSpec::Bind {
                        source: source.to_string(),
                        target: long.target.clone(),
                        read_only: long.read_only,
                    })
                }
                Some("volume") => {
                    let source = require_source(service_name, long.source.as_deref())?;
                    Ok(named_volume_mount(
                        project,
                        source,
                        &long.target,
                        long.read_only,
                    ))
                }
                None => {
                    let source = require_source(service_name, long.source.as_deref())?;
                    Ok(auto_mount(project, source, &long.target, long.read_only))
                }
                Some(other) => Err(Error::Validation(format!(
                    "services.{service_name}.volumes: unknown mount type '{other}'"
                ))),
            }
        }
    }
}

fn require_source<'a>(service_name: &str, source: Option<&'a str>) -> Result<&'a str> {
    source.ok_or_else(|| {
        Error::Validation(format!(
            "services.{service_name}.volumes: mount needs a source"
        ))
    })
}

/// `source:target[:flags]`
fn parse_short_mount(project: &Project, service_name: &str, input: &str) -> Result<MountSpec> {
    let parts: Vec<&str> = input.split(':').collect();
    let (source, target, flags) = match parts.as_slice() {
        [source, target] => (*source, *target, ""),
        [source, target, flags] => (*source, *target, *flags),
        _ => {
            return Err(Error::Validation(format!(
                "services.{service_name}.volumes: expected source:target[:flags], got '{input}'"
            )))
        }
    };
    let read_only = flags.split(',').any(|f| f == "ro");
    Ok(auto_mount(project, source, target, read_only))
}

/// Path-shaped sources bind-mount verbatim; everything else is a named
/// volume and picks up the project prefix.
fn auto_mount(project: &Project, source: &str, target: &str, read_only: bool) -> MountSpec {
    if is_path_source(source) {
        MountSpec::Bind {
            source: source.to_string(),
            target: target.to_string(),
            read_only,
        }
    } else {
        named_volume_mount(project, source, target, read_only)
    }
}

fn is_path_source(source: &str) -> bool {
    source.starts_with('/') || source.starts_with("./") || source.starts_with("../")
}

fn named_volume_mount(project: &Project, source: &str, target: &str, read_only: bool) -> MountSpec {
    let (source, has_unit) = match project.volumes.get(source) {
        Some(volume) if volume.is_external() => (
            volume.name.clone().unwrap_or_else(|| source.to_string()),
            false,
        ),
        Some(_) => (naming::prefix(&project.name, source), true),
        // Undeclared volumes still get the project namespace but have no
        // unit of their own
        None => (naming::prefix(&project.name, source), false),
    };
    MountSpec::Volume {
        source,
        target: target.to_string(),
        read_only,
        has_unit,
    }
}

fn resolve_network_ref(project: &Project, name: &str) -> NetworkRef {
    match project.networks.get(name) {
        Some(network) if network.is_external() => NetworkRef {
            name: network.name.clone().unwrap_or_else(|| name.to_string()),
            external: true,
            has_unit: false,
        },
        Some(_) => NetworkRef {
            name: naming::prefix(&project.name, name),
            external: false,
            has_unit: true,
        },
        None if name == "default" => NetworkRef {
            name: naming::prefix(&project.name, "default"),
            external: false,
            has_unit: false,
        },
        // A reference to a network this project never declared is assumed
        // to be managed elsewhere
        None => NetworkRef {
            name: name.to_string(),
            external: true,
            has_unit: false,
        },
    }
}

/// Networks for a service that declared none: the project's `default`
/// network if declared, else every local project network, else the
/// implicit `<project>-default`.
fn default_networks(project: &Project) -> Vec<NetworkRef> {
    if project.networks.contains_key("default") {
        return vec![resolve_network_ref(project, "default")];
    }

    let locals: Vec<NetworkRef> = project
        .local_networks()
        .map(|(name, _)| NetworkRef {
            name: naming::prefix(&project.name, name),
            external: false,
            has_unit: true,
        })
        .collect();

    if locals.is_empty() {
        vec![NetworkRef {
            name: naming::prefix(&project.name, "default"),
            external: false,
            has_unit: false,
        }]
    } else {
        locals
    }
}

fn convert_healthcheck(health: &HealthcheckConfig) -> Option<HealthcheckSpec> {
    if health.disable {
        return None;
    }
    let test = health.test.as_ref()?.to_vec();
    let test = match test.first().map(String::as_str) {
        Some("NONE") => return None,
        Some("CMD") | Some("CMD-SHELL") => test[1..].to_vec(),
        _ => test,
    };
    if test.is_empty() {
        return None;
    }

    Some(HealthcheckSpec {
        test,
        interval: health
            .interval
            .as_deref()
            .and_then(crate::compose::model::parse_duration),
        timeout: health
            .timeout
            .as_deref()
            .and_then(crate::compose::model::parse_duration),
        retries: health
            .retries
            .map(|r| r.clamp(0, i32::MAX as i64) as i32)
            .unwrap_or(3),
        start_period: health
            .start_period
            .as_deref()
            .and_then(crate::compose::model::parse_duration),
    })
}

fn parse_security_opts(opts: &[String]) -> SecuritySpec {
    let mut security = SecuritySpec::default();
    for opt in opts {
        if opt == "no-new-privileges" || opt == "no-new-privileges:true" {
            security.no_new_privileges = true;
        } else if let Some(profile) = opt.strip_prefix("seccomp=") {
            security.seccomp_profile = Some(profile.to_string());
        } else if let Some(profile) = opt.strip_prefix("apparmor=") {
            security.apparmor_profile = Some(profile.to_string());
        } else if let Some(path) = opt.strip_prefix("mask=") {
            security.mask.push(path.to_string());
        } else if let Some(path) = opt.strip_prefix("unmask=") {
            security.unmask.push(path.to_string());
        } else if let Some(label) = opt.strip_prefix("label=") {
            match label {
                "disable" => security.label_disable = true,
                "nested" => security.label_nested = true,
                _ if label.starts_with("type:") => {
                    security.selinux_type = Some(label["type:".len()..].to_string());
                }
                _ if label.starts_with("level:") => {
                    security.selinux_level = Some(label["level:".len()..].to_string());
                }
                _ if label.starts_with("filetype:") => {
                    security.selinux_filetype = Some(label["filetype:".len()..].to_string());
                }
                _ => security.other.push(opt.clone()),
            }
        } else {
            security.other.push(opt.clone());
        }
    }
    security
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::model::ComposeFile;
    use tempfile::TempDir;

    fn project(name: &str, yaml: &str) -> Project {
        let file: ComposeFile = serde_yaml::from_str(yaml).unwrap();
        Project::from_file(
            file,
            name.to_string(),
            PathBuf::from("/srv/compose").join(name),
            BTreeMap::new(),
        )
    }

    fn convert(project: &Project) -> Vec<Spec> {
        convert_project(&CancelToken::new(), project).unwrap()
    }

    fn find<'a>(specs: &'a [Spec], name: &str) -> &'a Spec {
        specs
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("no spec named {name}"))
    }

    #[test]
    fn simple_service_gets_default_network() {
        let project = project("blog", "services:\n  web:\n    image: nginx\n");
        let specs = convert(&project);

        assert_eq!(specs.len(), 1);
        let web = find(&specs, "blog-web");
        let container = web.as_container().unwrap();
        assert_eq!(container.image.as_deref(), Some("nginx"));
        assert_eq!(container.network_names(), vec!["blog-default"]);
        assert!(!container.networks[0].has_unit);
        assert!(container.mounts.is_empty());
        assert_eq!(container.restart, RestartPolicy::No);
    }

    #[test]
    fn external_network_kept_verbatim_local_prefixed() {
        let project = project(
            "llm",
            r#"
services:
  ollama:
    image: ollama/ollama
    networks: [default, infrastructure-proxy]
networks:
  default:
  infrastructure-proxy:
    external: true
"#,
        );
        let specs = convert(&project);
        let ollama = find(&specs, "llm-ollama").as_container().unwrap();
        assert_eq!(
            ollama.network_names(),
            vec!["infrastructure-proxy", "llm-default"]
        );

        let external = ollama
            .networks
            .iter()
            .find(|n| n.name == "infrastructure-proxy")
            .unwrap();
        assert!(external.external);
        assert!(!external.has_unit);

        // The external network contributes no standalone Spec
        assert!(specs.iter().all(|s| s.name != "infrastructure-proxy"));
        assert!(specs.iter().any(|s| s.name == "llm-default"));
    }

    #[test]
    fn undeclared_network_reference_is_treated_as_external() {
        let project = project(
            "llm",
            "services:\n  ollama:\n    image: x\n    networks: [default, infrastructure-proxy]\n",
        );
        let specs = convert(&project);
        let ollama = find(&specs, "llm-ollama").as_container().unwrap();
        assert_eq!(
            ollama.network_names(),
            vec!["infrastructure-proxy", "llm-default"]
        );
    }

    #[test]
    fn build_and_init_expand_into_sibling_specs() {
        let project = project(
            "proj",
            r#"
services:
  api:
    build:
      context: .
      dockerfile: Dockerfile
    x-quad-ops-init:
      - image: busybox
        command: ["migrate"]
"#,
        );
        let specs = convert(&project);
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["proj-api-build", "proj-api-init-0", "proj-api"]);

        let api = find(&specs, "proj-api");
        let deps: Vec<&str> = api.depends_on.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(deps, vec!["proj-api-build", "proj-api-init-0"]);

        let init = find(&specs, "proj-api-init-0").as_container().unwrap();
        assert!(init.one_shot);
        assert_eq!(init.command, vec!["migrate"]);

        let container = api.as_container().unwrap();
        assert!(container.image.is_none());
        assert_eq!(container.build.as_deref(), Some("proj-api-build"));
    }

    #[test]
    fn init_inherits_parent_env_and_mounts_unless_overridden() {
        let project = project(
            "proj",
            r#"
services:
  db:
    image: postgres
    environment:
      PGDATA: /var/lib/postgresql/data
    volumes:
      - data:/var/lib/postgresql/data
    x-quad-ops-init:
      - image: busybox
      - image: busybox
        environment:
          ONLY: "this"
        volumes:
          - scratch:/scratch
volumes:
  data:
  scratch:
"#,
        );
        let specs = convert(&project);

        let inherited = find(&specs, "proj-db-init-0").as_container().unwrap();
        assert_eq!(inherited.env["PGDATA"], "/var/lib/postgresql/data");
        assert_eq!(inherited.mounted_volumes(), vec!["proj-data"]);

        let overridden = find(&specs, "proj-db-init-1").as_container().unwrap();
        assert_eq!(overridden.env.len(), 1);
        assert_eq!(overridden.env["ONLY"], "this");
        assert_eq!(overridden.mounted_volumes(), vec!["proj-scratch"]);
    }

    #[test]
    fn named_volumes_prefixed_externals_verbatim_binds_untouched() {
        let project = project(
            "app",
            r#"
services:
  web:
    image: nginx
    volumes:
      - data:/var/lib/app
      - shared:/shared
      - ./conf:/etc/app:ro
      - /abs/path:/abs
volumes:
  data:
  unused:
  shared:
    external: true
    name: org-shared
"#,
        );
        let specs = convert(&project);
        let web = find(&specs, "app-web").as_container().unwrap();

        assert_eq!(web.mounted_volumes(), vec!["app-data", "org-shared"]);
        assert!(web.mounts.iter().any(|m| matches!(
            m,
            MountSpec::Bind { source, read_only: true, .. } if source == "./conf"
        )));
        assert!(web.mounts.iter().any(|m| matches!(
            m,
            MountSpec::Bind { source, read_only: false, .. } if source == "/abs/path"
        )));

        // Unreferenced local volumes still get standalone Specs; external
        // ones never do
        assert!(specs.iter().any(|s| s.name == "app-unused"));
        assert!(specs.iter().any(|s| s.name == "app-data"));
        assert!(specs.iter().all(|s| s.name != "org-shared" && s.name != "app-shared"));
    }

    #[test]
    fn ports_clamp_and_default_to_tcp() {
        let project = project(
            "app",
            r#"
services:
  web:
    image: nginx
    ports:
      - "8080:80"
      - "127.0.0.1:53:53/udp"
      - "99999:70000"
      - target: 9000
"#,
        );
        let specs = convert(&project);
        let ports = &find(&specs, "app-web").as_container().unwrap().ports;

        assert_eq!(ports[0].host_port, Some(8080));
        assert_eq!(ports[0].container, 80);
        assert_eq!(ports[0].protocol, Protocol::Tcp);

        assert_eq!(ports[1].host.as_deref(), Some("127.0.0.1"));
        assert_eq!(ports[1].protocol, Protocol::Udp);

        // Out-of-range ports clamp rather than overflow
        assert_eq!(ports[2].host_port, Some(65535));
        assert_eq!(ports[2].container, 65535);

        assert_eq!(ports[3].host_port, None);
        assert_eq!(ports[3].container, 9000);
    }

    #[test]
    fn tmpfs_mount_carries_size_and_mode() {
        let project = project(
            "app",
            r#"
services:
  web:
    image: nginx
    volumes:
      - type: tmpfs
        target: /scratch
        tmpfs:
          size: 64m
          mode: "1777"
"#,
        );
        let specs = convert(&project);
        let mounts = &find(&specs, "app-web").as_container().unwrap().mounts;
        assert_eq!(
            mounts[0],
            MountSpec::Tmpfs {
                target: "/scratch".into(),
                size: Some(64 * 1024 * 1024),
                mode: Some("1777".into()),
            }
        );
    }

    #[test]
    fn podman_volumes_extension_appends_mounts() {
        let project = project(
            "app",
            r#"
services:
  web:
    image: nginx
    x-podman-volumes:
      - cache:/var/cache
      - ./local:/srv:ro
volumes:
  cache:
"#,
        );
        let specs = convert(&project);
        let web = find(&specs, "app-web").as_container().unwrap();
        assert_eq!(web.mounted_volumes(), vec!["app-cache"]);
        assert!(web.mounts.iter().any(|m| matches!(
            m,
            MountSpec::Bind { source, read_only: true, .. } if source == "./local"
        )));
    }

    #[test]
    fn buildargs_extension_overrides_compose_args() {
        let project = project(
            "app",
            r#"
services:
  api:
    build:
      context: .
      dockerfile: Dockerfile
      args:
        VERSION: "1"
        KEEP: "yes"
    x-podman-buildargs:
      VERSION: "2"
"#,
        );
        let specs = convert(&project);
        let build = match &find(&specs, "app-api-build").resource {
            Resource::Build(b) => b,
            other => panic!("expected build spec, got {other:?}"),
        };
        assert_eq!(build.args["VERSION"], "2");
        assert_eq!(build.args["KEEP"], "yes");
        assert_eq!(build.dockerfile, "Dockerfile");
        assert_eq!(build.image_tag, "localhost/app-api:latest");
    }

    #[test]
    fn env_secrets_and_external_deps_carry_through() {
        let project = project(
            "app",
            r#"
services:
  db:
    image: postgres
    x-podman-env-secrets:
      pg_password: PG_PASSWORD
    x-quad-ops-depends-on:
      - project: infra
        service: proxy
        optional: true
"#,
        );
        let specs = convert(&project);
        let db = find(&specs, "app-db");
        assert_eq!(
            db.as_container().unwrap().env_secrets["pg_password"],
            "PG_PASSWORD"
        );
        assert_eq!(
            db.external_dependencies,
            vec![ExternalDependency {
                project: "infra".into(),
                service: "proxy".into(),
                optional: true,
            }]
        );
    }

    #[test]
    fn depends_on_is_prefixed_and_sorted() {
        let project = project(
            "app",
            r#"
services:
  web:
    image: nginx
    depends_on: [db, cache]
  db:
    image: postgres
  cache:
    image: redis
"#,
        );
        let specs = convert(&project);
        let deps: Vec<&str> = find(&specs, "app-web")
            .depends_on
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(deps, vec!["app-cache", "app-db"]);
    }

    #[test]
    fn cpu_quota_uses_fixed_period() {
        let project = project(
            "app",
            "services:\n  web:\n    image: nginx\n    cpus: 0.5\n",
        );
        let specs = convert(&project);
        let container = find(&specs, "app-web").as_container().unwrap();
        assert_eq!(container.cpu_quota, Some(50_000));
    }

    #[test]
    fn memory_falls_back_to_deploy_limits() {
        let project = project(
            "app",
            r#"
services:
  web:
    image: nginx
    shm_size: 128m
    deploy:
      resources:
        limits:
          memory: 512m
"#,
        );
        let specs = convert(&project);
        let container = find(&specs, "app-web").as_container().unwrap();
        assert_eq!(container.memory_limit, Some(512 * 1024 * 1024));
        assert_eq!(container.shm_size, Some(128 * 1024 * 1024));
    }

    #[test]
    fn disabled_healthcheck_drops_and_retries_clamp() {
        let project = project(
            "app",
            r#"
services:
  a:
    image: x
    healthcheck:
      disable: true
      test: ["CMD", "true"]
  b:
    image: y
    healthcheck:
      test: ["CMD", "curl", "-f", "http://localhost/"]
      retries: 99999999999
"#,
        );
        let specs = convert(&project);
        assert!(find(&specs, "app-a").as_container().unwrap().healthcheck.is_none());

        let health = find(&specs, "app-b")
            .as_container()
            .unwrap()
            .healthcheck
            .clone()
            .unwrap();
        assert_eq!(health.test, vec!["curl", "-f", "http://localhost/"]);
        assert_eq!(health.retries, i32::MAX);
    }

    #[test]
    fn security_opts_parse_into_dedicated_fields() {
        let security = parse_security_opts(&[
            "no-new-privileges:true".into(),
            "seccomp=/etc/profile.json".into(),
            "label=type:svc_t".into(),
            "label=disable".into(),
            "mask=/proc/acpi".into(),
            "unmask=/sys/firmware".into(),
        ]);
        assert!(security.no_new_privileges);
        assert_eq!(security.seccomp_profile.as_deref(), Some("/etc/profile.json"));
        assert_eq!(security.selinux_type.as_deref(), Some("svc_t"));
        assert!(security.label_disable);
        assert_eq!(security.mask, vec!["/proc/acpi"]);
        assert_eq!(security.unmask, vec!["/sys/firmware"]);
        assert!(security.other.is_empty());
    }

    #[test]
    fn env_file_probes_are_discovered_sorted() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("env")).unwrap();
        std::fs::write(dir.path().join("web.env"), "A=1\n").unwrap();
        std::fs::write(dir.path().join("env/web.env"), "B=2\n").unwrap();
        std::fs::write(dir.path().join(".env.web"), "C=3\n").unwrap();

        let file: ComposeFile =
            serde_yaml::from_str("services:\n  web:\n    image: nginx\n").unwrap();
        let project = Project::from_file(
            file,
            "app".to_string(),
            dir.path().to_path_buf(),
            BTreeMap::new(),
        );

        let specs = convert(&project);
        let env_files = &find(&specs, "app-web").as_container().unwrap().env_files;
        let expected = {
            let mut v = vec![
                dir.path().join(".env.web"),
                dir.path().join("env/web.env"),
                dir.path().join("web.env"),
            ];
            v.sort();
            v
        };
        assert_eq!(env_files, &expected);
    }

    #[test]
    fn duplicate_names_across_resources_are_rejected() {
        let project = project(
            "app",
            "services:\n  data:\n    image: x\nvolumes:\n  data:\n",
        );
        let err = convert_project(&CancelToken::new(), &project).unwrap_err();
        assert!(err.is_validation_error());
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn cancellation_stops_conversion() {
        let project = project("app", "services:\n  web:\n    image: nginx\n");
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(convert_project(&cancel, &project)
            .unwrap_err()
            .is_cancelled());
    }
}
