//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Env-file parsing and compose-text variable interpolation

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::naming;

/// Values longer than this are rejected outright.
pub const MAX_VALUE_LEN: usize = 32 * 1024;

/// `$$`, `${VAR}`, or `$VAR`
static VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

/// Parse a `KEY=value` env file.
///
/// Blank lines and `#` comments are skipped. Values may be double-quoted,
/// in which case common escapes are honored. Keys must match the env-key
/// grammar and may not collide (case-insensitively) with the protected
/// host variables.
pub fn parse_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::from_io(path, e))?;
    let mut pairs = Vec::new();

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::Loader(format!(
                "{}:{}: expected KEY=value",
                path.display(),
                line_no + 1
            ))
        })?;
        let key = key.trim();

        if !naming::is_valid_env_key(key) {
            return Err(Error::Loader(format!(
                "{}:{}: invalid environment key '{key}'",
                path.display(),
                line_no + 1
            )));
        }
        if naming::is_protected_env_key(key) {
            return Err(Error::Loader(format!(
                "{}:{}: refusing to override protected variable '{key}'",
                path.display(),
                line_no + 1
            )));
        }

        let value = unquote(value.trim());
        if value.len() > MAX_VALUE_LEN {
            return Err(Error::Loader(format!(
                "{}:{}: value for '{key}' exceeds {MAX_VALUE_LEN} bytes",
                path.display(),
                line_no + 1
            )));
        }

        pairs.push((key.to_string(), value));
    }

    Ok(pairs)
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        }
        out
    } else {
        value.to_string()
    }
}

/// Merge the environment layers, later layers overwriting earlier ones:
/// each file in `env_files` in order, then the project directory's `.env`
/// if present, then the caller-supplied overrides.
pub fn merge_environment(
    env_files: &[PathBuf],
    project_dir: &Path,
    overrides: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let mut merged = BTreeMap::new();

    for file in env_files {
        for (key, value) in parse_env_file(file)? {
            merged.insert(key, value);
        }
    }

    let dot_env = project_dir.join(".env");
    if dot_env.is_file() {
        for (key, value) in parse_env_file(&dot_env)? {
            merged.insert(key, value);
        }
    }

    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }

    Ok(merged)
}

/// Substitute `${VAR}` and `$VAR` references with values from `env`.
///
/// `$$` escapes to a literal `$`. Undefined variables are left literal so
/// the error surfaces where the value is used, not as a silent empty
/// string.
pub fn interpolate(text: &str, env: &BTreeMap<String, String>) -> String {
    VAR_PATTERN
        .replace_all(text, |caps: &Captures| {
            let whole = caps.get(0).unwrap().as_str();
            if whole == "$$" {
                return "$".to_string();
            }
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match env.get(name) {
                Some(value) => value.clone(),
                None => whole.to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_comments_blanks_and_quotes() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "app.env",
            "# comment\n\nA=1\nB=\"two words\"\nC=\"line\\nbreak\"\n",
        );

        let pairs = parse_env_file(&path).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), "line\nbreak".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_invalid_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bad.env", "9KEY=x\n");
        let err = parse_env_file(&path).unwrap_err();
        assert!(err.is_loader_error());
        assert!(err.to_string().contains("9KEY"));
    }

    #[test]
    fn rejects_protected_keys_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bad.env", "Path=/tmp/evil\n");
        let err = parse_env_file(&path).unwrap_err();
        assert!(err.to_string().contains("protected"));
    }

    #[test]
    fn rejects_oversized_values() {
        let dir = TempDir::new().unwrap();
        let big = "x".repeat(MAX_VALUE_LEN + 1);
        let path = write_file(&dir, "big.env", &format!("BIG={big}\n"));
        let err = parse_env_file(&path).unwrap_err();
        assert!(err.to_string().contains("exceeds"));

        let ok = "x".repeat(MAX_VALUE_LEN);
        let path = write_file(&dir, "ok.env", &format!("BIG={ok}\n"));
        assert!(parse_env_file(&path).is_ok());
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let err = parse_env_file(Path::new("/nonexistent/.env")).unwrap_err();
        assert!(err.is_file_not_found());
    }

    #[test]
    fn precedence_later_layers_win() {
        let dir = TempDir::new().unwrap();
        let first = write_file(&dir, "first.env", "A=first\nB=first\nC=first\n");
        let second = write_file(&dir, "second.env", "B=second\n");
        write_file(&dir, ".env", "C=dotenv\nD=dotenv\n");

        let mut overrides = BTreeMap::new();
        overrides.insert("D".to_string(), "override".to_string());

        let merged = merge_environment(&[first, second], dir.path(), &overrides).unwrap();
        assert_eq!(merged["A"], "first");
        assert_eq!(merged["B"], "second");
        assert_eq!(merged["C"], "dotenv");
        assert_eq!(merged["D"], "override");
    }

    #[test]
    fn interpolation_rules() {
        let mut env = BTreeMap::new();
        env.insert("TAG".to_string(), "v2".to_string());
        env.insert("PORT".to_string(), "8080".to_string());

        assert_eq!(interpolate("image: app:${TAG}", &env), "image: app:v2");
        assert_eq!(interpolate("port: $PORT", &env), "port: 8080");
        // Undefined variables stay literal
        assert_eq!(interpolate("x: ${MISSING}", &env), "x: ${MISSING}");
        assert_eq!(interpolate("y: $MISSING", &env), "y: $MISSING");
        // $$ escapes to a single literal dollar
        assert_eq!(interpolate("cost: $$5 and $$TAG", &env), "cost: $5 and $TAG");
    }
}
