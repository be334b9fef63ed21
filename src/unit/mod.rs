//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Quadlet unit kinds, file naming, and the unit-directory adapter

pub mod render;

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The four quadlet unit kinds this tool writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitKind {
    Container,
    Volume,
    Network,
    Build,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Container => "container",
            UnitKind::Volume => "volume",
            UnitKind::Network => "network",
            UnitKind::Build => "build",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "container" => Some(UnitKind::Container),
            "volume" => Some(UnitKind::Volume),
            "network" => Some(UnitKind::Network),
            "build" => Some(UnitKind::Build),
            _ => None,
        }
    }

    /// Quadlet file extension for this kind.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// The systemd service the quadlet generator derives from a unit file.
    ///
    /// `X.container` becomes `X.service`; the other kinds get a type
    /// suffix: `X.volume` becomes `X-volume.service`, and so on.
    pub fn service_name(&self, unit_name: &str) -> String {
        match self {
            UnitKind::Container => format!("{unit_name}.service"),
            UnitKind::Volume => format!("{unit_name}-volume.service"),
            UnitKind::Network => format!("{unit_name}-network.service"),
            UnitKind::Build => format!("{unit_name}-build.service"),
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File name of a unit: `<name>.<kind>`.
pub fn file_name(name: &str, kind: UnitKind) -> String {
    format!("{name}.{}", kind.extension())
}

/// Hex sha-256 of unit content, the identity used for change detection.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// The directory the quadlet generator reads from.
///
/// All writes go through a temp file in the same directory so a crashed
/// pass never leaves a half-written unit behind.
#[derive(Debug, Clone)]
pub struct UnitDirectory {
    root: PathBuf,
}

impl UnitDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str, kind: UnitKind) -> PathBuf {
        self.root.join(file_name(name, kind))
    }

    /// Write a unit file atomically.
    pub fn write(&self, name: &str, kind: UnitKind, content: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        let target = self.path_for(name, kind);
        tmp.persist(&target).map_err(|e| e.error)?;
        debug!("Wrote {}", target.display());
        Ok(())
    }

    /// Remove a unit file; a file that is already gone is not an error.
    pub fn remove(&self, name: &str, kind: UnitKind) -> std::io::Result<()> {
        match std::fs::remove_file(self.path_for(name, kind)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn read(&self, name: &str, kind: UnitKind) -> std::io::Result<String> {
        std::fs::read_to_string(self.path_for(name, kind))
    }
}
