//! Trace lifecycle commands: init, detect, finalize, refinalize,
//! rebuild-index, heal, archive.

use agentrace_config::Config;
use agentrace_trace::TraceStore;
use agentrace_utils::error::{AgentraceError, ConfigError, TraceError};
use agentrace_utils::types::timestamp_now;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;

use super::common::{print_json, resolve_project};

/// Start a trace; prints the new id on stdout.
pub fn execute_init_command(config: &Config, agent: &str, project: Option<PathBuf>) -> Result<()> {
    let project = resolve_project(project)?;
    let trace_id = TraceStore::open(config)
        .init(&project, agent)
        .with_context(|| format!("Failed to start {agent} trace for {project}"))?;
    println!("{trace_id}");
    Ok(())
}

/// Print the active trace id; not finding one is exit code 4.
pub fn execute_detect_command(config: &Config, agent: &str, project: Option<PathBuf>) -> Result<()> {
    let project = resolve_project(project)?;
    match TraceStore::open(config).detect_active(&project, agent)? {
        Some(trace_id) => {
            println!("{trace_id}");
            Ok(())
        }
        None => Err(AgentraceError::from(TraceError::NotFound {
            trace_id: format!("active {agent} trace for {project}"),
        })
        .into()),
    }
}

pub fn execute_finalize_command(
    config: &Config,
    trace_id: &str,
    agent: &str,
    project: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let project = resolve_project(project)?;
    let result = TraceStore::open(config)
        .finalize(trace_id, &project, agent)
        .with_context(|| format!("Failed to finalize trace {trace_id}"))?;

    if json {
        return print_json(&result.manifest);
    }

    let m = &result.manifest;
    let state = match (result.already_finalized, result.changed) {
        (false, _) => "finalized",
        (true, true) => "re-finalized (updated)",
        (true, false) => "already finalized (unchanged)",
    };
    println!("{trace_id}: {state}");
    println!(
        "  outcome: {}  test_result: {}  files_changed: {}  duration: {}s",
        m.outcome.map_or_else(|| "-".to_string(), |o| o.to_string()),
        m.test_result.map_or_else(|| "-".to_string(), |t| t.to_string()),
        m.files_changed.unwrap_or(0),
        m.duration_seconds.unwrap_or(0),
    );
    Ok(())
}

pub fn execute_refinalize_command(config: &Config, trace_id: Option<&str>, all: bool) -> Result<()> {
    let store = TraceStore::open(config);

    if all {
        let changed = store
            .refinalize_all()
            .context("Failed to re-finalize traces")?;
        for id in &changed {
            println!("  ✓ {id}");
        }
        println!("{} trace(s) updated", changed.len());
        return Ok(());
    }

    let Some(trace_id) = trace_id else {
        return Err(AgentraceError::from(ConfigError::InvalidValue {
            key: "trace_id".to_string(),
            value: "a trace id or --all is required".to_string(),
        })
        .into());
    };
    let changed = store
        .refinalize(trace_id)
        .with_context(|| format!("Failed to re-finalize trace {trace_id}"))?;
    println!("{trace_id}: {}", if changed { "updated" } else { "unchanged" });
    Ok(())
}

pub fn execute_rebuild_index_command(config: &Config) -> Result<()> {
    let rows = TraceStore::open(config).rebuild_index()?;
    println!("index rebuilt: {rows} row(s)");
    Ok(())
}

pub fn execute_heal_command(config: &Config) -> Result<()> {
    let healed = TraceStore::open(config).heal_stale(timestamp_now())?;
    for id in &healed {
        println!("  ✓ closed {id}");
    }
    println!("{} stale trace(s) healed", healed.len());
    Ok(())
}

pub fn execute_archive_command(config: &Config, before: Option<&str>, older_than_days: u32) -> Result<()> {
    let cutoff = match before {
        Some(text) => parse_cutoff(text)?,
        None => timestamp_now() - Duration::days(i64::from(older_than_days)),
    };
    let moved = TraceStore::open(config).archive_before(cutoff)?;
    println!("{} trace(s) archived (started before {})", moved.len(), cutoff.to_rfc3339());
    Ok(())
}

fn parse_cutoff(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            AgentraceError::from(ConfigError::InvalidValue {
                key: "before".to_string(),
                value: format!("{text} ({e})"),
            })
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cutoff_accepts_offsets() {
        let t = parse_cutoff("2026-03-01T12:00:00+02:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2026-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_parse_cutoff_rejects_dates_without_time() {
        let err = parse_cutoff("2026-03-01").unwrap_err();
        assert!(err.downcast_ref::<AgentraceError>().is_some());
    }
}
