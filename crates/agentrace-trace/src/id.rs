//! Trace id allocation: `{agent_type}-{YYYYMMDD-HHMMSS}-{6 hex}`.
//!
//! Uniqueness comes from creating the trace directory exclusively; a
//! collision simply draws a new suffix.

use agentrace_utils::error::{AgentraceError, Result, TraceError};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::layout::TraceLayout;

const MAX_ATTEMPTS: u32 = 16;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Agent types become part of directory and marker names.
pub fn validate_agent_type(agent_type: &str) -> Result<()> {
    let valid = !agent_type.is_empty()
        && agent_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(TraceError::InvalidTraceId {
            trace_id: agent_type.to_string(),
            reason: "agent type must be non-empty ASCII letters, digits, '-' or '_'".to_string(),
        }
        .into())
    }
}

fn random_suffix(agent_type: &str, now: DateTime<Utc>, attempt: u32) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(agent_type.as_bytes());
    hasher.update(&now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(&Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(&COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(&attempt.to_le_bytes());
    hasher.finalize().to_hex()[..6].to_string()
}

/// Format an id for `agent_type` at `now` with the given suffix.
#[must_use]
pub fn format_trace_id(agent_type: &str, now: DateTime<Utc>, suffix: &str) -> String {
    format!("{agent_type}-{}-{suffix}", now.format("%Y%m%d-%H%M%S"))
}

/// Allocate a fresh id and create `{id}/artifacts/`. Returns the id and the
/// trace directory.
pub fn allocate(layout: &TraceLayout, agent_type: &str, now: DateTime<Utc>) -> Result<(String, Utf8PathBuf)> {
    validate_agent_type(agent_type)?;
    fs::create_dir_all(layout.root()).map_err(|e| AgentraceError::io(layout.root(), e))?;

    for attempt in 0..MAX_ATTEMPTS {
        let trace_id = format_trace_id(agent_type, now, &random_suffix(agent_type, now, attempt));
        let dir = layout.trace_dir(&trace_id);
        match fs::create_dir(&dir) {
            Ok(()) => {
                let artifacts = layout.artifacts_dir(&trace_id);
                fs::create_dir(&artifacts).map_err(|e| AgentraceError::io(&artifacts, e))?;
                return Ok((trace_id, dir));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(trace_id = %trace_id, attempt, "trace id collision, retrying");
            }
            Err(e) => return Err(AgentraceError::io(&dir, e)),
        }
    }

    Err(TraceError::AllocationFailed {
        reason: format!("{MAX_ATTEMPTS} consecutive id collisions under {}", layout.root()),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrace_utils::test_support::{base_time, utf8_path};
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_id_format() {
        let id = format_trace_id("implementer", base_time(), "a1b2c3");
        assert_eq!(id, "implementer-20260101-000000-a1b2c3");
    }

    #[test]
    fn test_allocate_creates_artifacts_dir() {
        let td = TempDir::new().unwrap();
        let layout = TraceLayout::new(utf8_path(&td).join("traces"));

        let (id, dir) = allocate(&layout, "tester", base_time()).unwrap();

        assert!(id.starts_with("tester-20260101-000000-"));
        assert_eq!(id.len(), "tester-20260101-000000-".len() + 6);
        assert!(dir.join("artifacts").is_dir());
    }

    #[test]
    fn test_same_second_allocations_are_distinct() {
        let td = TempDir::new().unwrap();
        let layout = TraceLayout::new(utf8_path(&td));

        let ids: HashSet<String> = (0..50)
            .map(|_| allocate(&layout, "implementer", base_time()).unwrap().0)
            .collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_rejects_bad_agent_type() {
        let td = TempDir::new().unwrap();
        let layout = TraceLayout::new(utf8_path(&td));
        assert!(allocate(&layout, "", base_time()).is_err());
        assert!(allocate(&layout, "a/b", base_time()).is_err());
        assert!(allocate(&layout, "with space", base_time()).is_err());
    }
}
