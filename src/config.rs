//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Tool configuration: unit directory, state database, systemd scope

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SYSTEM_UNIT_DIR: &str = "/etc/containers/systemd";
const SYSTEM_DB_PATH: &str = "/var/lib/skipan/skipan.db";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("cannot determine home directories for user scope")]
    NoUserDirs,
}

/// Resolved configuration, passed explicitly to the components that need
/// it. There is no process-wide config singleton.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory the quadlet generator reads unit files from.
    pub unit_dir: PathBuf,
    /// Path of the tracked-unit database.
    pub db_path: PathBuf,
    /// Drive the user systemd instance instead of the system one.
    pub user: bool,
}

/// On-disk TOML shape; every field optional, flags win over the file.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    unit_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    user: Option<bool>,
}

impl Config {
    /// Resolve configuration from an optional TOML file plus overrides.
    pub fn resolve(
        file: Option<&Path>,
        user_flag: bool,
        unit_dir_override: Option<PathBuf>,
        db_path_override: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let parsed = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                toml::from_str::<ConfigFile>(&text).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => ConfigFile::default(),
        };

        let user = user_flag || parsed.user.unwrap_or(false);

        let unit_dir = match unit_dir_override.or(parsed.unit_dir) {
            Some(dir) => dir,
            None if user => dirs::config_dir()
                .ok_or(ConfigError::NoUserDirs)?
                .join("containers/systemd"),
            None => PathBuf::from(SYSTEM_UNIT_DIR),
        };

        let db_path = match db_path_override.or(parsed.db_path) {
            Some(path) => path,
            None if user => dirs::data_dir()
                .ok_or(ConfigError::NoUserDirs)?
                .join("skipan/skipan.db"),
            None => PathBuf::from(SYSTEM_DB_PATH),
        };

        Ok(Self {
            unit_dir,
            db_path,
            user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_to_system_paths() {
        let config = Config::resolve(None, false, None, None).unwrap();
        assert_eq!(config.unit_dir, PathBuf::from(SYSTEM_UNIT_DIR));
        assert_eq!(config.db_path, PathBuf::from(SYSTEM_DB_PATH));
        assert!(!config.user);
    }

    #[test]
    fn overrides_beat_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "unit_dir = \"/tmp/units\"\nuser = true").unwrap();

        let config = Config::resolve(
            Some(file.path()),
            false,
            Some(PathBuf::from("/override/units")),
            Some(PathBuf::from("/override/db.sqlite")),
        )
        .unwrap();

        assert_eq!(config.unit_dir, PathBuf::from("/override/units"));
        assert_eq!(config.db_path, PathBuf::from("/override/db.sqlite"));
        assert!(config.user);
    }

    #[test]
    fn rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "unit_dir = [not toml").unwrap();

        let err = Config::resolve(Some(file.path()), false, None, None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
