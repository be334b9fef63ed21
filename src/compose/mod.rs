//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Compose project loading pipeline

pub mod env;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load, load_all, LoadOptions, LoadResult, COMPOSE_FILE_NAMES};

use std::collections::BTreeMap;
use std::path::PathBuf;

use model::{
    ComposeFile, ServiceConfig, TopLevelConfig, TopLevelNetwork, TopLevelSecret, TopLevelVolume,
};

/// A parsed and named compose project.
///
/// All maps are ordered so every downstream traversal is deterministic.
#[derive(Debug)]
pub struct Project {
    /// Project name; anchors all resource prefixing.
    pub name: String,
    /// Directory the compose file was resolved in.
    pub working_dir: PathBuf,
    pub services: BTreeMap<String, ServiceConfig>,
    pub volumes: BTreeMap<String, TopLevelVolume>,
    pub networks: BTreeMap<String, TopLevelNetwork>,
    pub configs: BTreeMap<String, TopLevelConfig>,
    pub secrets: BTreeMap<String, TopLevelSecret>,
    /// Environment the compose text was interpolated with.
    pub environment: BTreeMap<String, String>,
}

impl Project {
    /// Assemble a project from a parsed file. Bare `volumes:`/`networks:`
    /// keys normalize to their default configurations.
    pub fn from_file(
        file: ComposeFile,
        name: String,
        working_dir: PathBuf,
        environment: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name,
            working_dir,
            services: file.services,
            volumes: file
                .volumes
                .into_iter()
                .map(|(k, v)| (k, v.unwrap_or_default()))
                .collect(),
            networks: file
                .networks
                .into_iter()
                .map(|(k, v)| (k, v.unwrap_or_default()))
                .collect(),
            configs: file.configs,
            secrets: file.secrets,
            environment,
        }
    }

    /// Networks declared in this project that are not external.
    pub fn local_networks(&self) -> impl Iterator<Item = (&String, &TopLevelNetwork)> {
        self.networks.iter().filter(|(_, n)| !n.is_external())
    }

    /// Volumes declared in this project that are not external.
    pub fn local_volumes(&self) -> impl Iterator<Item = (&String, &TopLevelVolume)> {
        self.volumes.iter().filter(|(_, v)| !v.is_external())
    }
}
