//! Helpers shared by command handlers.

use agentrace_utils::canonicalization::emit_jcs;
use agentrace_utils::error::{AgentraceError, ConfigError};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde::Serialize;
use std::path::PathBuf;

/// `--project` or the current directory, as an absolute UTF-8 path.
pub(crate) fn resolve_project(project: Option<PathBuf>) -> Result<Utf8PathBuf> {
    let path = match project {
        Some(p) => p,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    let path = std::path::absolute(&path)
        .with_context(|| format!("Failed to resolve project path: {}", path.display()))?;
    Utf8PathBuf::try_from(path).map_err(|e| {
        AgentraceError::from(ConfigError::InvalidValue {
            key: "project".to_string(),
            value: format!("{} (not valid UTF-8)", e.as_path().display()),
        })
        .into()
    })
}

/// Print `value` as canonical JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = emit_jcs(value).context("Failed to emit JSON output")?;
    println!("{json}");
    Ok(())
}

/// `0.42` -> `42.0%`; unobserved rates print as `-`.
pub(crate) fn format_rate(rate: Option<f64>) -> String {
    rate.map_or_else(|| "-".to_string(), |r| format!("{:.1}%", r * 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(Some(0.425)), "42.5%");
        assert_eq!(format_rate(None), "-");
    }

    #[test]
    fn test_resolve_project_is_absolute() {
        let p = resolve_project(Some(PathBuf::from("relative/dir"))).unwrap();
        assert!(p.is_absolute());
        assert!(p.ends_with("relative/dir"));
    }
}
