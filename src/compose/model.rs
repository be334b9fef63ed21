//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Serde model of the supported compose subset

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Top-level compose file structure
#[derive(Debug, Default, Deserialize)]
pub struct ComposeFile {
    /// Version (ignored, always v3+ semantics)
    #[serde(default)]
    pub version: Option<String>,

    /// Explicit project name
    #[serde(default)]
    pub name: Option<String>,

    /// Service definitions
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,

    /// Named volume definitions (a bare key maps to defaults)
    #[serde(default)]
    pub volumes: BTreeMap<String, Option<TopLevelVolume>>,

    /// Network definitions
    #[serde(default)]
    pub networks: BTreeMap<String, Option<TopLevelNetwork>>,

    /// Config definitions
    #[serde(default)]
    pub configs: BTreeMap<String, TopLevelConfig>,

    /// Secret definitions
    #[serde(default)]
    pub secrets: BTreeMap<String, TopLevelSecret>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceConfig {
    /// Container image
    pub image: Option<String>,

    /// Build definition
    pub build: Option<BuildConfig>,

    /// Override command
    pub command: Option<StringOrList>,

    /// Container entrypoint
    pub entrypoint: Option<StringOrList>,

    /// Environment variables
    #[serde(default)]
    pub environment: Option<EnvironmentConfig>,

    /// Environment files
    pub env_file: Option<StringOrList>,

    /// Port mappings
    #[serde(default)]
    pub ports: Vec<PortConfig>,

    /// Volume mounts
    #[serde(default)]
    pub volumes: Vec<VolumeMountConfig>,

    /// Networks to attach
    #[serde(default)]
    pub networks: Option<NetworksConfig>,

    /// Network mode (bridge, host)
    pub network_mode: Option<String>,

    /// IPC mode
    pub ipc: Option<String>,

    /// Service dependencies
    #[serde(default)]
    pub depends_on: Option<DependsOnConfig>,

    /// Restart policy
    pub restart: Option<String>,

    /// Health check
    pub healthcheck: Option<HealthcheckConfig>,

    /// Logging configuration
    pub logging: Option<LoggingConfig>,

    /// Signal to stop the container
    pub stop_signal: Option<String>,

    /// Grace period before the stop signal escalates
    pub stop_grace_period: Option<String>,

    /// Security options
    #[serde(default)]
    pub security_opt: Vec<String>,

    #[serde(default)]
    pub cap_add: Vec<String>,

    #[serde(default)]
    pub cap_drop: Vec<String>,

    #[serde(default)]
    pub privileged: bool,

    /// User override (no quadlet mapping, rejected at validation)
    pub user: Option<String>,

    /// Service-level tmpfs key (no quadlet mapping, rejected at validation)
    pub tmpfs: Option<StringOrList>,

    /// Compose profiles (no quadlet mapping, rejected at validation)
    #[serde(default)]
    pub profiles: Vec<String>,

    /// Deploy config (only resource limits are honored)
    pub deploy: Option<DeployConfig>,

    /// Memory limit ("512m", "2g", bytes)
    pub mem_limit: Option<MemoryValue>,

    /// CPU limit as a fraction of one core
    pub cpus: Option<f64>,

    /// Shared memory size
    pub shm_size: Option<MemoryValue>,

    /// Secrets mounted into the container
    #[serde(default)]
    pub secrets: Vec<ServiceSecret>,

    /// Container labels
    pub labels: Option<KeyValueList>,

    /// Container annotations
    pub annotations: Option<KeyValueList>,

    /// Extra build args, overriding `build.args`
    #[serde(rename = "x-podman-buildargs", default)]
    pub podman_buildargs: BTreeMap<String, String>,

    /// Extra mounts in `source:target[:flags]` form
    #[serde(rename = "x-podman-volumes", default)]
    pub podman_volumes: Vec<String>,

    /// Podman secrets exposed as environment variables
    #[serde(rename = "x-podman-env-secrets", default)]
    pub podman_env_secrets: BTreeMap<String, String>,

    /// One-shot init containers that must complete before this service
    #[serde(rename = "x-quad-ops-init", default)]
    pub init_containers: Vec<InitContainerConfig>,

    /// Dependencies on services owned by other projects
    #[serde(rename = "x-quad-ops-depends-on", default)]
    pub external_depends_on: Vec<ExternalDependsOn>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    String(String),
    List(Vec<String>),
}

impl StringOrList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            StringOrList::String(s) => vec![s.clone()],
            StringOrList::List(list) => list.clone(),
        }
    }
}

/// A scalar usable as an env/label value in YAML
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Number(serde_yaml::Number),
    String(String),
}

impl ScalarValue {
    pub fn to_env_string(&self) -> String {
        match self {
            ScalarValue::Bool(b) => b.to_string(),
            ScalarValue::Number(n) => n.to_string(),
            ScalarValue::String(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EnvironmentConfig {
    List(Vec<String>),
    Map(BTreeMap<String, Option<ScalarValue>>),
}

impl EnvironmentConfig {
    /// Normalize either shape into a map; null values become empty strings.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            EnvironmentConfig::List(items) => items
                .iter()
                .map(|item| match item.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (item.clone(), String::new()),
                })
                .collect(),
            EnvironmentConfig::Map(map) => map
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        v.as_ref().map(ScalarValue::to_env_string).unwrap_or_default(),
                    )
                })
                .collect(),
        }
    }
}

/// Labels / annotations in list or map form
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeyValueList {
    List(Vec<String>),
    Map(BTreeMap<String, Option<ScalarValue>>),
}

impl KeyValueList {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            KeyValueList::List(items) => items
                .iter()
                .map(|item| match item.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (item.clone(), String::new()),
                })
                .collect(),
            KeyValueList::Map(map) => map
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        v.as_ref().map(ScalarValue::to_env_string).unwrap_or_default(),
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BuildConfig {
    /// Shorthand: the build context directory
    Context(String),
    Long(BuildLong),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildLong {
    pub context: Option<String>,
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub args: Option<KeyValueList>,
}

impl BuildConfig {
    pub fn context(&self) -> Option<&str> {
        match self {
            BuildConfig::Context(c) => Some(c),
            BuildConfig::Long(long) => long.context.as_deref(),
        }
    }

    pub fn dockerfile(&self) -> Option<&str> {
        match self {
            BuildConfig::Context(_) => None,
            BuildConfig::Long(long) => long.dockerfile.as_deref(),
        }
    }

    pub fn args(&self) -> BTreeMap<String, String> {
        match self {
            BuildConfig::Context(_) => BTreeMap::new(),
            BuildConfig::Long(long) => long.args.as_ref().map(KeyValueList::to_map).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortConfig {
    /// Bare container port
    Number(u32),
    /// Short syntax: `[host_ip:][published:]target[/protocol]`
    Short(String),
    Long(PortLong),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortLong {
    pub target: u32,
    #[serde(default)]
    pub published: Option<PublishedPort>,
    #[serde(default)]
    pub host_ip: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

/// Published port as number or string (ranges arrive as strings)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PublishedPort {
    Number(u32),
    String(String),
}

impl PublishedPort {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            PublishedPort::Number(n) => Some(*n),
            PublishedPort::String(s) => s.parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VolumeMountConfig {
    /// Short syntax: `source:target[:options]` or `target`
    Short(String),
    Long(VolumeMountLong),
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolumeMountLong {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub source: Option<String>,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
    pub tmpfs: Option<TmpfsOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmpfsOptions {
    pub size: Option<MemoryValue>,
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NetworksConfig {
    List(Vec<String>),
    Map(BTreeMap<String, Option<NetworkAttachment>>),
}

impl NetworksConfig {
    pub fn names(&self) -> Vec<String> {
        match self {
            NetworksConfig::List(list) => list.clone(),
            NetworksConfig::Map(map) => map.keys().cloned().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NetworkAttachment {
    pub aliases: Option<Vec<String>>,
    pub ipv4_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DependsOnConfig {
    List(Vec<String>),
    Map(BTreeMap<String, DependsOnCondition>),
}

impl DependsOnConfig {
    /// Dependency names with their conditions; list entries have none.
    pub fn entries(&self) -> Vec<(String, Option<String>)> {
        match self {
            DependsOnConfig::List(list) => list.iter().map(|n| (n.clone(), None)).collect(),
            DependsOnConfig::Map(map) => map
                .iter()
                .map(|(n, c)| (n.clone(), c.condition.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DependsOnCondition {
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthcheckConfig {
    pub test: Option<StringOrList>,
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub retries: Option<i64>,
    pub start_period: Option<String>,
    #[serde(default)]
    pub disable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub driver: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeployConfig {
    pub replicas: Option<u32>,
    pub placement: Option<PlacementConfig>,
    pub resources: Option<ResourcesConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlacementConfig {
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub preferences: Vec<serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourcesConfig {
    pub limits: Option<ResourceLimits>,
    pub reservations: Option<ResourceLimits>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceLimits {
    pub cpus: Option<CpuValue>,
    pub memory: Option<MemoryValue>,
}

/// CPUs arrive as number or quoted string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CpuValue {
    Number(f64),
    String(String),
}

impl CpuValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CpuValue::Number(n) => Some(*n),
            CpuValue::String(s) => s.parse().ok(),
        }
    }
}

/// Memory sizes arrive as bytes or suffixed strings ("512m")
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MemoryValue {
    Bytes(u64),
    String(String),
}

impl MemoryValue {
    pub fn as_bytes(&self) -> Option<u64> {
        match self {
            MemoryValue::Bytes(b) => Some(*b),
            MemoryValue::String(s) => parse_bytes(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServiceSecret {
    Name(String),
    Long { source: String, target: Option<String> },
}

impl ServiceSecret {
    /// Value for a quadlet `Secret=` line.
    pub fn to_secret_arg(&self) -> String {
        match self {
            ServiceSecret::Name(name) => name.clone(),
            ServiceSecret::Long {
                source,
                target: Some(target),
            } => format!("{source},target={target}"),
            ServiceSecret::Long { source, target: None } => source.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitContainerConfig {
    pub image: String,
    pub command: Option<StringOrList>,
    #[serde(default)]
    pub environment: Option<EnvironmentConfig>,
    #[serde(default)]
    pub volumes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalDependsOn {
    pub project: String,
    pub service: String,
    #[serde(default)]
    pub optional: bool,
}

/// `external: true` or the legacy `external: {name: ...}` object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExternalFlag {
    Bool(bool),
    Named { name: Option<String> },
}

impl ExternalFlag {
    pub fn is_external(&self) -> bool {
        match self {
            ExternalFlag::Bool(b) => *b,
            ExternalFlag::Named { .. } => true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopLevelVolume {
    pub driver: Option<String>,
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
    pub external: Option<ExternalFlag>,
    pub name: Option<String>,
    pub labels: Option<KeyValueList>,
}

impl TopLevelVolume {
    pub fn is_external(&self) -> bool {
        self.external.as_ref().is_some_and(ExternalFlag::is_external)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopLevelNetwork {
    pub driver: Option<String>,
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
    pub external: Option<ExternalFlag>,
    pub name: Option<String>,
    pub labels: Option<KeyValueList>,
}

impl TopLevelNetwork {
    pub fn is_external(&self) -> bool {
        self.external.as_ref().is_some_and(ExternalFlag::is_external)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopLevelConfig {
    pub file: Option<String>,
    pub external: Option<ExternalFlag>,
    pub driver: Option<String>,
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopLevelSecret {
    pub file: Option<String>,
    pub external: Option<ExternalFlag>,
    pub driver: Option<String>,
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
}

/// Parse a memory size: plain bytes or a `b`/`k`/`m`/`g` suffix.
pub fn parse_bytes(input: &str) -> Option<u64> {
    let s = input.trim().to_lowercase();
    if let Ok(b) = s.parse::<u64>() {
        return Some(b);
    }

    let (digits, unit) = s.split_at(s.len().checked_sub(1)?);
    // Tolerate "kb"/"mb"/"gb" spellings
    let (digits, unit) = if unit == "b" && digits.ends_with(['k', 'm', 'g']) {
        digits.split_at(digits.len() - 1)
    } else {
        (digits, unit)
    };

    let value: u64 = digits.trim().parse().ok()?;
    match unit {
        "b" => Some(value),
        "k" => Some(value * 1024),
        "m" => Some(value * 1024 * 1024),
        "g" => Some(value * 1024 * 1024 * 1024),
        _ => None,
    }
}

/// Parse a compose duration: `1h2m3s`, `500ms`, `30s`, or bare seconds.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s.starts_with('-') {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c {
            'h' => Duration::from_secs(value * 3600),
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                Duration::from_millis(value)
            }
            'm' => Duration::from_secs(value * 60),
            's' => Duration::from_secs(value),
            _ => return None,
        };
        total += unit;
    }
    if !digits.is_empty() {
        // Trailing digits with no unit
        return None;
    }
    Some(total)
}
