//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Crate-wide error taxonomy
//!
//! Subsystems keep their own small error enums; everything that crosses a
//! subsystem boundary is folded into [`Error`] so callers can dispatch on
//! kind without downcasting.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("cannot access {}: {source}", path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {}: {source}", path.display())]
    InvalidYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("loader error: {0}")]
    Loader(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("quadlet compatibility: {0}")]
    QuadletCompat(String),

    #[error("dependency cycle: {}", nodes.join(" -> "))]
    Cycle { nodes: Vec<String> },

    #[error("failed to write unit {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to restart {unit}: {message}")]
    Restart { unit: String, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("state store: {0}")]
    State(#[from] crate::state::StateError),
}

impl Error {
    pub fn is_file_not_found(&self) -> bool {
        matches!(self, Error::FileNotFound { .. })
    }

    pub fn is_path_error(&self) -> bool {
        matches!(self, Error::Path { .. })
    }

    pub fn is_invalid_yaml(&self) -> bool {
        matches!(self, Error::InvalidYaml { .. })
    }

    pub fn is_loader_error(&self) -> bool {
        matches!(self, Error::Loader(_))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_compat_error(&self) -> bool {
        matches!(self, Error::QuadletCompat(_))
    }

    pub fn is_cycle_error(&self) -> bool {
        matches!(self, Error::Cycle { .. })
    }

    pub fn is_write_error(&self) -> bool {
        matches!(self, Error::Write { .. })
    }

    pub fn is_restart_error(&self) -> bool {
        matches!(self, Error::Restart { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Wrap an IO error, mapping NotFound onto the dedicated kind.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound { path }
        } else {
            Error::Path { path, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn predicates_match_their_kind() {
        let err = Error::Validation("services.web.restart: bad value".into());
        assert!(err.is_validation_error());
        assert!(!err.is_compat_error());

        let err = Error::Cycle {
            nodes: vec!["a".into(), "b".into(), "a".into()],
        };
        assert!(err.is_cycle_error());
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
    }

    #[test]
    fn io_not_found_maps_to_file_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(Error::from_io("/tmp/x", io).is_file_not_found());

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::from_io("/tmp/x", io);
        assert!(err.is_path_error());
        assert!(err.source().is_some());
    }
}
