//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Compose file discovery and project loading

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::naming;

use super::{env, model::ComposeFile, validate, Project};

/// Probe order when a directory is given; first hit wins.
pub const COMPOSE_FILE_NAMES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Caller-supplied loading options.
#[derive(Debug, Default, Clone)]
pub struct LoadOptions {
    /// Working directory override; defaults to the compose file's parent.
    pub workdir: Option<PathBuf>,
    /// Highest-precedence environment overrides.
    pub environment: BTreeMap<String, String>,
    /// Extra env files, merged in order below the project `.env`.
    pub env_files: Vec<PathBuf>,
    /// Explicit project name; defaults to the working-directory basename.
    pub project_name: Option<String>,
}

/// Outcome of loading one project during recursive discovery.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub result: Result<Project>,
}

/// Load a single compose project from a file or directory.
pub fn load(cancel: &CancelToken, path: &Path, opts: &LoadOptions) -> Result<Project> {
    cancel.check()?;

    let file = resolve_compose_file(path)?;
    debug!("Loading compose file {}", file.display());

    let working_dir = match &opts.workdir {
        Some(dir) => dir.clone(),
        None => file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let environment = env::merge_environment(&opts.env_files, &working_dir, &opts.environment)?;

    let text = std::fs::read_to_string(&file).map_err(|e| Error::from_io(&file, e))?;
    let text = env::interpolate(&text, &environment);

    let parsed: ComposeFile = serde_yaml::from_str(&text).map_err(|source| Error::InvalidYaml {
        path: file.clone(),
        source,
    })?;

    // The name must be in place before validation; it is derived from the
    // working directory unless the caller or the file set one.
    let name = opts
        .project_name
        .clone()
        .or_else(|| parsed.name.clone())
        .unwrap_or_else(|| derive_project_name(&working_dir));

    let project = Project::from_file(parsed, name, working_dir, environment);

    validate::validate_project(&project)?;
    validate::validate_quadlet_compat(&project)?;

    Ok(project)
}

/// Recursively discover and load every compose project under `dir`.
///
/// One unreadable subtree or broken project never blocks the rest; each
/// failure is captured in its [`LoadResult`].
pub fn load_all(cancel: &CancelToken, dir: &Path, opts: &LoadOptions) -> Result<Vec<LoadResult>> {
    cancel.check()?;

    let mut project_dirs = BTreeSet::new();
    let mut results = Vec::new();

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| dir.to_path_buf());
                warn!("Skipping unreadable path {}: {err}", path.display());
                results.push(LoadResult {
                    result: Err(Error::Path {
                        path: path.clone(),
                        source: err
                            .into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("walk error")),
                    }),
                    path,
                });
                continue;
            }
        };

        if entry.file_type().is_file()
            && COMPOSE_FILE_NAMES
                .iter()
                .any(|name| entry.file_name() == *name)
        {
            if let Some(parent) = entry.path().parent() {
                project_dirs.insert(parent.to_path_buf());
            }
        }
    }

    for project_dir in project_dirs {
        cancel.check()?;

        let per_dir = LoadOptions {
            workdir: None,
            environment: opts.environment.clone(),
            env_files: opts.env_files.clone(),
            // An explicit name only makes sense for a single project
            project_name: None,
        };
        let result = load(cancel, &project_dir, &per_dir);
        results.push(LoadResult {
            path: project_dir,
            result,
        });
    }

    Ok(results)
}

/// Resolve the compose file for a path that may be a file or a directory.
fn resolve_compose_file(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if path.is_dir() {
        for name in COMPOSE_FILE_NAMES {
            let candidate = path.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }
    Err(Error::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn derive_project_name(working_dir: &Path) -> String {
    let basename = working_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    naming::sanitize_project_name(&basename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MINIMAL: &str = "services:\n  web:\n    image: nginx\n";

    fn project_dir(root: &TempDir, name: &str, file_name: &str, content: &str) -> PathBuf {
        let dir = root.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file_name), content).unwrap();
        dir
    }

    #[test]
    fn probes_file_names_in_order() {
        let root = TempDir::new().unwrap();
        let dir = project_dir(&root, "blog", "docker-compose.yml", MINIMAL);
        // Higher-priority name added second still wins
        fs::write(dir.join("compose.yaml"), "services:\n  first:\n    image: a\n").unwrap();

        let resolved = resolve_compose_file(&dir).unwrap();
        assert_eq!(resolved.file_name().unwrap(), "compose.yaml");
    }

    #[test]
    fn loads_and_names_from_directory() {
        let root = TempDir::new().unwrap();
        let dir = project_dir(&root, "My Blog", "compose.yaml", MINIMAL);

        let cancel = CancelToken::new();
        let project = load(&cancel, &dir, &LoadOptions::default()).unwrap();
        assert_eq!(project.name, "my-blog");
        assert!(project.services.contains_key("web"));
    }

    #[test]
    fn explicit_name_wins_over_directory() {
        let root = TempDir::new().unwrap();
        let dir = project_dir(&root, "blog", "compose.yaml", MINIMAL);

        let opts = LoadOptions {
            project_name: Some("site".into()),
            ..Default::default()
        };
        let project = load(&CancelToken::new(), &dir, &opts).unwrap();
        assert_eq!(project.name, "site");
    }

    #[test]
    fn interpolates_from_dot_env() {
        let root = TempDir::new().unwrap();
        let dir = project_dir(
            &root,
            "app",
            "compose.yaml",
            "services:\n  web:\n    image: nginx:${TAG}\n",
        );
        fs::write(dir.join(".env"), "TAG=1.27\n").unwrap();

        let project = load(&CancelToken::new(), &dir, &LoadOptions::default()).unwrap();
        assert_eq!(
            project.services["web"].image.as_deref(),
            Some("nginx:1.27")
        );
    }

    #[test]
    fn option_environment_beats_dot_env() {
        let root = TempDir::new().unwrap();
        let dir = project_dir(
            &root,
            "app",
            "compose.yaml",
            "services:\n  web:\n    image: nginx:${TAG}\n",
        );
        fs::write(dir.join(".env"), "TAG=old\n").unwrap();

        let mut environment = BTreeMap::new();
        environment.insert("TAG".to_string(), "new".to_string());
        let opts = LoadOptions {
            environment,
            ..Default::default()
        };
        let project = load(&CancelToken::new(), &dir, &opts).unwrap();
        assert_eq!(project.services["web"].image.as_deref(), Some("nginx:new"));
    }

    #[test]
    fn missing_path_reports_not_found() {
        let err = load(
            &CancelToken::new(),
            Path::new("/nonexistent"),
            &LoadOptions::default(),
        )
        .unwrap_err();
        assert!(err.is_file_not_found());
    }

    #[test]
    fn invalid_yaml_is_its_own_kind() {
        let root = TempDir::new().unwrap();
        let dir = project_dir(&root, "bad", "compose.yaml", "services: [not: a map\n");

        let err = load(&CancelToken::new(), &dir, &LoadOptions::default()).unwrap_err();
        assert!(err.is_invalid_yaml());
    }

    #[test]
    fn load_all_continues_past_broken_projects() {
        let root = TempDir::new().unwrap();
        project_dir(&root, "good", "compose.yaml", MINIMAL);
        project_dir(&root, "broken", "compose.yaml", "services: {web: {}}\n");
        project_dir(&root, "nested/deeper", "compose.yml", MINIMAL);

        let results = load_all(&CancelToken::new(), root.path(), &LoadOptions::default()).unwrap();
        assert_eq!(results.len(), 3);

        let ok: Vec<_> = results.iter().filter(|r| r.result.is_ok()).collect();
        let failed: Vec<_> = results.iter().filter(|r| r.result.is_err()).collect();
        assert_eq!(ok.len(), 2);
        assert_eq!(failed.len(), 1);
        assert!(failed[0].path.ends_with("broken"));
    }

    #[test]
    fn cancellation_short_circuits() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = load(&cancel, Path::new("."), &LoadOptions::default()).unwrap_err();
        assert!(err.is_cancelled());
    }
}
