//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Spec → quadlet unit text
//!
//! Pure formatting: the same Spec always renders to the same bytes. All
//! collections reaching this point are already sorted by the converter.

use std::fmt::Write;
use std::time::Duration;

use crate::spec::{
    BuildSpec, ContainerSpec, MountSpec, NetworkMode, NetworkSpec, Resource, Spec, VolumeSpec,
};

const HEADER: &str = "# Generated by skipan - manual edits will be overwritten\n";

/// Render a Spec into the text of its quadlet unit file.
pub fn render(spec: &Spec) -> String {
    match &spec.resource {
        Resource::Container(container) => render_container(spec, container),
        Resource::Volume(volume) => render_volume(spec, volume),
        Resource::Network(network) => render_network(spec, network),
        Resource::Build(build) => render_build(spec, build),
    }
}

fn render_container(spec: &Spec, container: &ContainerSpec) -> String {
    let mut out = String::from(HEADER);

    out.push_str("[Unit]\n");
    line(&mut out, "Description", format!("{} container", spec.name));

    let mut after: Vec<String> = spec
        .depends_on
        .iter()
        .map(|dep| dep.kind.service_name(&dep.name))
        .collect();
    let mut requires = after.clone();
    let mut wants = Vec::new();
    for external in &spec.external_dependencies {
        let service = external.service_unit();
        after.push(service.clone());
        if external.optional {
            wants.push(service);
        } else {
            requires.push(service);
        }
    }
    if !after.is_empty() {
        line(&mut out, "After", after.join(" "));
    }
    if !requires.is_empty() {
        line(&mut out, "Requires", requires.join(" "));
    }
    if !wants.is_empty() {
        line(&mut out, "Wants", wants.join(" "));
    }

    out.push_str("\n[Container]\n");
    line(&mut out, "ContainerName", &spec.name);
    match (&container.image, &container.build) {
        (Some(image), _) => line(&mut out, "Image", image),
        (None, Some(build)) => line(&mut out, "Image", format!("{build}.build")),
        (None, None) => {}
    }

    if !container.entrypoint.is_empty() {
        line(&mut out, "Entrypoint", container.entrypoint.join(" "));
    }
    if !container.command.is_empty() {
        line(&mut out, "Exec", container.command.join(" "));
    }

    for (key, value) in &container.env {
        line(&mut out, "Environment", format!("{key}={value}"));
    }
    for file in &container.env_files {
        line(&mut out, "EnvironmentFile", file.display());
    }
    for (secret, variable) in &container.env_secrets {
        line(&mut out, "Secret", format!("{secret},type=env,target={variable}"));
    }
    for secret in &container.secrets {
        line(&mut out, "Secret", secret);
    }

    for port in &container.ports {
        let mut value = String::new();
        if let Some(host) = &port.host {
            write!(value, "{host}:").unwrap();
        }
        if let Some(host_port) = port.host_port {
            write!(value, "{host_port}:").unwrap();
        } else if port.host.is_some() {
            value.push(':');
        }
        write!(value, "{}", port.container).unwrap();
        if port.protocol != crate::spec::Protocol::Tcp {
            write!(value, "/{}", port.protocol.as_str()).unwrap();
        }
        line(&mut out, "PublishPort", value);
    }

    for mount in &container.mounts {
        match mount {
            MountSpec::Bind {
                source,
                target,
                read_only,
            } => {
                let ro = if *read_only { ":ro" } else { "" };
                line(&mut out, "Volume", format!("{source}:{target}{ro}"));
            }
            MountSpec::Volume {
                source,
                target,
                read_only,
                has_unit,
            } => {
                let source = if *has_unit {
                    format!("{source}.volume")
                } else {
                    source.clone()
                };
                let ro = if *read_only { ":ro" } else { "" };
                line(&mut out, "Volume", format!("{source}:{target}{ro}"));
            }
            MountSpec::Tmpfs { target, size, mode } => {
                let mut value = target.clone();
                let mut opts = Vec::new();
                if let Some(size) = size {
                    opts.push(format!("size={}", format_memory(*size)));
                }
                if let Some(mode) = mode {
                    opts.push(format!("mode={mode}"));
                }
                if !opts.is_empty() {
                    write!(value, ":{}", opts.join(",")).unwrap();
                }
                line(&mut out, "Tmpfs", value);
            }
        }
    }

    match container.network_mode {
        Some(NetworkMode::Host) => line(&mut out, "Network", "host"),
        _ => {
            for network in &container.networks {
                let value = if network.has_unit {
                    format!("{}.network", network.name)
                } else {
                    network.name.clone()
                };
                line(&mut out, "Network", value);
            }
        }
    }

    for cap in &container.cap_add {
        line(&mut out, "AddCapability", cap);
    }
    for cap in &container.cap_drop {
        line(&mut out, "DropCapability", cap);
    }

    let security = &container.security;
    if security.no_new_privileges {
        line(&mut out, "NoNewPrivileges", "true");
    }
    if let Some(profile) = &security.seccomp_profile {
        line(&mut out, "SeccompProfile", profile);
    }
    if security.label_disable {
        line(&mut out, "SecurityLabelDisable", "true");
    }
    if security.label_nested {
        line(&mut out, "SecurityLabelNested", "true");
    }
    if let Some(value) = &security.selinux_type {
        line(&mut out, "SecurityLabelType", value);
    }
    if let Some(value) = &security.selinux_level {
        line(&mut out, "SecurityLabelLevel", value);
    }
    if let Some(value) = &security.selinux_filetype {
        line(&mut out, "SecurityLabelFileType", value);
    }
    for path in &security.mask {
        line(&mut out, "Mask", path);
    }
    for path in &security.unmask {
        line(&mut out, "Unmask", path);
    }

    if let Some(ipc) = container.ipc {
        let value = match ipc {
            crate::spec::IpcMode::Private => "private",
            crate::spec::IpcMode::Shareable => "shareable",
        };
        line(&mut out, "PodmanArgs", format!("--ipc {value}"));
    }

    if let Some(health) = &container.healthcheck {
        line(&mut out, "HealthCmd", health.test.join(" "));
        if let Some(interval) = health.interval {
            line(&mut out, "HealthInterval", format_duration(interval));
        }
        if let Some(timeout) = health.timeout {
            line(&mut out, "HealthTimeout", format_duration(timeout));
        }
        line(&mut out, "HealthRetries", health.retries);
        if let Some(start) = health.start_period {
            line(&mut out, "HealthStartPeriod", format_duration(start));
        }
    }

    if let Some(logging) = &container.logging {
        line(&mut out, "LogDriver", logging.driver.as_str());
        for (key, value) in &logging.options {
            line(&mut out, "LogOpt", format!("{key}={value}"));
        }
    }

    if let Some(signal) = &container.stop_signal {
        line(&mut out, "StopSignal", signal);
    }
    if let Some(timeout) = container.stop_timeout {
        line(&mut out, "StopTimeout", timeout);
    }

    if let Some(memory) = container.memory_limit {
        line(&mut out, "Memory", format_memory(memory));
    }
    if let Some(shm) = container.shm_size {
        line(&mut out, "ShmSize", format_memory(shm));
    }
    if let Some(quota) = container.cpu_quota {
        line(
            &mut out,
            "PodmanArgs",
            format!(
                "--cpu-period {} --cpu-quota {quota}",
                crate::spec::convert::CPU_PERIOD_US
            ),
        );
    }

    for opt in &security.other {
        line(&mut out, "PodmanArgs", format!("--security-opt {opt}"));
    }
    if let Some(profile) = &security.apparmor_profile {
        line(&mut out, "PodmanArgs", format!("--security-opt apparmor={profile}"));
    }
    if container.privileged {
        line(&mut out, "PodmanArgs", "--privileged");
    }

    for (key, value) in &container.labels {
        line(&mut out, "Label", format!("{key}={value}"));
    }
    for (key, value) in &spec.annotations {
        line(&mut out, "Annotation", format!("{key}={value}"));
    }

    out.push_str("\n[Service]\n");
    if container.one_shot {
        line(&mut out, "Type", "oneshot");
        line(&mut out, "RemainAfterExit", "yes");
        line(&mut out, "Restart", "no");
    } else {
        line(&mut out, "Restart", container.restart.systemd_value());
    }

    out.push_str("\n[Install]\n");
    line(&mut out, "WantedBy", "default.target");

    out
}

fn render_volume(spec: &Spec, volume: &VolumeSpec) -> String {
    let mut out = String::from(HEADER);

    out.push_str("[Unit]\n");
    line(&mut out, "Description", format!("{} volume", spec.name));

    out.push_str("\n[Volume]\n");
    if let Some(driver) = &volume.driver {
        line(&mut out, "Driver", driver);
    }
    for (key, value) in &volume.options {
        // The local driver's conventional opts map onto dedicated keys
        match key.as_str() {
            "device" => line(&mut out, "Device", value),
            "type" => line(&mut out, "Type", value),
            "o" => line(&mut out, "Options", value),
            _ => line(&mut out, "PodmanArgs", format!("--opt {key}={value}")),
        }
    }
    for (key, value) in &volume.labels {
        line(&mut out, "Label", format!("{key}={value}"));
    }

    out
}

fn render_network(spec: &Spec, network: &NetworkSpec) -> String {
    let mut out = String::from(HEADER);

    out.push_str("[Unit]\n");
    line(&mut out, "Description", format!("{} network", spec.name));

    out.push_str("\n[Network]\n");
    if let Some(driver) = &network.driver {
        line(&mut out, "Driver", driver);
    }
    for (key, value) in &network.options {
        line(&mut out, "PodmanArgs", format!("--opt {key}={value}"));
    }
    for (key, value) in &network.labels {
        line(&mut out, "Label", format!("{key}={value}"));
    }

    out
}

fn render_build(spec: &Spec, build: &BuildSpec) -> String {
    let mut out = String::from(HEADER);

    out.push_str("[Unit]\n");
    line(&mut out, "Description", format!("{} image build", spec.name));

    out.push_str("\n[Build]\n");
    line(&mut out, "ImageTag", &build.image_tag);
    line(&mut out, "File", &build.dockerfile);
    line(&mut out, "SetWorkingDirectory", &build.context);
    for (key, value) in &build.args {
        line(&mut out, "PodmanArgs", format!("--build-arg {key}={value}"));
    }

    out.push_str("\n[Service]\n");
    line(&mut out, "Type", "oneshot");
    line(&mut out, "RemainAfterExit", "yes");

    out
}

fn line(out: &mut String, key: &str, value: impl std::fmt::Display) {
    writeln!(out, "{key}={value}").unwrap();
}

/// Render a byte count with the largest suffix that divides it evenly.
pub fn format_memory(bytes: u64) -> String {
    const K: u64 = 1024;
    const M: u64 = K * 1024;
    const G: u64 = M * 1024;

    if bytes != 0 && bytes % G == 0 {
        format!("{}g", bytes / G)
    } else if bytes != 0 && bytes % M == 0 {
        format!("{}m", bytes / M)
    } else if bytes != 0 && bytes % K == 0 {
        format!("{}k", bytes / K)
    } else {
        bytes.to_string()
    }
}

fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{millis}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{
        ExternalDependency, HealthcheckSpec, NetworkRef, PortSpec, Protocol, RestartPolicy,
        UnitRef,
    };
    use crate::unit::UnitKind;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn spec_with(container: ContainerSpec) -> Spec {
        Spec {
            name: "blog-web".to_string(),
            project: "blog".to_string(),
            resource: Resource::Container(container),
            depends_on: Vec::new(),
            external_dependencies: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    #[test]
    fn memory_formatter_boundaries() {
        assert_eq!(format_memory(1023), "1023");
        assert_eq!(format_memory(1024), "1k");
        assert_eq!(format_memory(1024 * 1024), "1m");
        assert_eq!(format_memory(1024 * 1024 * 1024), "1g");
        assert_eq!(format_memory(1536), "1536");
        assert_eq!(format_memory(512 * 1024 * 1024), "512m");
    }

    #[test]
    fn container_unit_has_expected_lines() {
        let mut env = BTreeMap::new();
        env.insert("MODE".to_string(), "prod".to_string());

        let spec = spec_with(ContainerSpec {
            image: Some("nginx:alpine".into()),
            env,
            ports: vec![PortSpec {
                host: None,
                host_port: Some(8080),
                container: 80,
                protocol: Protocol::Tcp,
            }],
            mounts: vec![MountSpec::Volume {
                source: "blog-data".into(),
                target: "/data".into(),
                read_only: false,
                has_unit: true,
            }],
            networks: vec![NetworkRef {
                name: "blog-default".into(),
                external: false,
                has_unit: false,
            }],
            restart: RestartPolicy::Always,
            ..Default::default()
        });

        let text = render(&spec);
        assert!(text.contains("ContainerName=blog-web"));
        assert!(text.contains("Image=nginx:alpine"));
        assert!(text.contains("Environment=MODE=prod"));
        assert!(text.contains("PublishPort=8080:80"));
        assert!(text.contains("Volume=blog-data.volume:/data"));
        assert!(text.contains("Network=blog-default\n"));
        assert!(text.contains("Restart=always"));
        assert!(text.contains("WantedBy=default.target"));
    }

    #[test]
    fn rendering_is_byte_stable() {
        let spec = spec_with(ContainerSpec {
            image: Some("nginx".into()),
            ..Default::default()
        });
        assert_eq!(render(&spec), render(&spec));
    }

    #[test]
    fn dependencies_render_as_service_names() {
        let mut spec = spec_with(ContainerSpec {
            image: None,
            build: Some("blog-web-build".into()),
            ..Default::default()
        });
        spec.depends_on = vec![
            UnitRef {
                name: "blog-db".into(),
                kind: UnitKind::Container,
            },
            UnitRef {
                name: "blog-web-build".into(),
                kind: UnitKind::Build,
            },
        ];
        spec.external_dependencies = vec![ExternalDependency {
            project: "infra".into(),
            service: "proxy".into(),
            optional: true,
        }];

        let text = render(&spec);
        assert!(text.contains("After=blog-db.service blog-web-build-build.service infra-proxy.service"));
        assert!(text.contains("Requires=blog-db.service blog-web-build-build.service\n"));
        assert!(text.contains("Wants=infra-proxy.service"));
        assert!(text.contains("Image=blog-web-build.build"));
    }

    #[test]
    fn one_shot_containers_are_oneshot_services() {
        let spec = spec_with(ContainerSpec {
            image: Some("busybox".into()),
            command: vec!["migrate".into()],
            one_shot: true,
            ..Default::default()
        });
        let text = render(&spec);
        assert!(text.contains("Type=oneshot"));
        assert!(text.contains("RemainAfterExit=yes"));
        assert!(text.contains("Exec=migrate"));
    }

    #[test]
    fn host_network_suppresses_attachments() {
        let spec = spec_with(ContainerSpec {
            image: Some("nginx".into()),
            network_mode: Some(NetworkMode::Host),
            networks: vec![NetworkRef {
                name: "blog-default".into(),
                external: false,
                has_unit: false,
            }],
            ..Default::default()
        });
        let text = render(&spec);
        assert!(text.contains("Network=host"));
        assert!(!text.contains("Network=blog-default"));
    }

    #[test]
    fn healthcheck_and_secrets_render() {
        let mut env_secrets = BTreeMap::new();
        env_secrets.insert("pg_password".to_string(), "PG_PASSWORD".to_string());

        let spec = spec_with(ContainerSpec {
            image: Some("postgres".into()),
            env_secrets,
            healthcheck: Some(HealthcheckSpec {
                test: vec!["pg_isready".into()],
                interval: Some(Duration::from_secs(30)),
                timeout: Some(Duration::from_millis(1500)),
                retries: 5,
                start_period: None,
            }),
            ..Default::default()
        });
        let text = render(&spec);
        assert!(text.contains("Secret=pg_password,type=env,target=PG_PASSWORD"));
        assert!(text.contains("HealthCmd=pg_isready"));
        assert!(text.contains("HealthInterval=30s"));
        assert!(text.contains("HealthTimeout=1500ms"));
        assert!(text.contains("HealthRetries=5"));
    }

    #[test]
    fn volume_and_network_units() {
        let volume = Spec {
            name: "blog-data".to_string(),
            project: "blog".to_string(),
            resource: Resource::Volume(VolumeSpec {
                driver: Some("local".into()),
                options: BTreeMap::new(),
                labels: BTreeMap::new(),
            }),
            depends_on: Vec::new(),
            external_dependencies: Vec::new(),
            annotations: BTreeMap::new(),
        };
        let text = render(&volume);
        assert!(text.contains("[Volume]"));
        assert!(text.contains("Driver=local"));

        let network = Spec {
            name: "blog-default".to_string(),
            project: "blog".to_string(),
            resource: Resource::Network(NetworkSpec {
                driver: Some("bridge".into()),
                options: BTreeMap::new(),
                labels: BTreeMap::new(),
            }),
            depends_on: Vec::new(),
            external_dependencies: Vec::new(),
            annotations: BTreeMap::new(),
        };
        let text = render(&network);
        assert!(text.contains("[Network]"));
        assert!(text.contains("Driver=bridge"));
    }

    #[test]
    fn build_unit_is_oneshot_with_args() {
        let mut args = BTreeMap::new();
        args.insert("VERSION".to_string(), "2".to_string());

        let build = Spec {
            name: "blog-api-build".to_string(),
            project: "blog".to_string(),
            resource: Resource::Build(BuildSpec {
                context: ".".into(),
                dockerfile: "Dockerfile".into(),
                args,
                image_tag: "localhost/blog-api:latest".into(),
            }),
            depends_on: Vec::new(),
            external_dependencies: Vec::new(),
            annotations: BTreeMap::new(),
        };
        let text = render(&build);
        assert!(text.contains("ImageTag=localhost/blog-api:latest"));
        assert!(text.contains("File=Dockerfile"));
        assert!(text.contains("SetWorkingDirectory=."));
        assert!(text.contains("PodmanArgs=--build-arg VERSION=2"));
        assert!(text.contains("Type=oneshot"));
    }
}
