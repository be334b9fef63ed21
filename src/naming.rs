//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Project and resource naming rules

use once_cell::sync::Lazy;
use regex::Regex;

/// Separator between the project prefix and a resource name.
///
/// Used consistently for Spec names, unit file names, and graph nodes.
pub const SEP: &str = "-";

/// Environment keys that may never be overridden from an env file.
pub const PROTECTED_ENV_KEYS: &[&str] =
    &["PATH", "HOME", "USER", "SHELL", "PWD", "OLDPWD", "TERM"];

static PROJECT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").unwrap());
static SERVICE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").unwrap());
static ENV_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static SECRET_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap());
static SECRET_ENV_VAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").unwrap());

pub fn is_valid_project_name(name: &str) -> bool {
    PROJECT_NAME.is_match(name)
}

pub fn is_valid_service_name(name: &str) -> bool {
    SERVICE_NAME.is_match(name)
}

pub fn is_valid_env_key(key: &str) -> bool {
    ENV_KEY.is_match(key)
}

pub fn is_protected_env_key(key: &str) -> bool {
    PROTECTED_ENV_KEYS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(key))
}

pub fn is_valid_secret_name(name: &str) -> bool {
    SECRET_NAME.is_match(name)
}

pub fn is_valid_secret_env_var(name: &str) -> bool {
    SECRET_ENV_VAR.is_match(name)
}

/// Prefix a resource name with the project namespace.
///
/// A resource that already carries the project name is passed through, so
/// re-running the converter over its own output is stable.
pub fn prefix(project: &str, resource: &str) -> String {
    if resource.contains(project) {
        resource.to_string()
    } else {
        format!("{project}{SEP}{resource}")
    }
}

/// Derive a valid project name from a directory basename.
///
/// Lowercases, maps everything outside `[a-z0-9_-]` to `-`, and strips
/// leading separators so the result satisfies the project-name grammar.
pub fn sanitize_project_name(basename: &str) -> String {
    let mapped: String = basename
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let trimmed = mapped.trim_start_matches(['-', '_']);
    if trimmed.is_empty() {
        "default".to_string()
    } else {
        trimmed.to_string()
    }
}
