//! Fixture builders shared by unit and integration tests.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fs;
use tempfile::TempDir;

use crate::types::{ComplianceRecord, HistoryRow, Manifest, TraceStatus};

/// UTF-8 view of a temp dir path.
#[must_use]
pub fn utf8_path(td: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(td.path().to_path_buf())
        .unwrap_or_else(|p| panic!("temp dir is not UTF-8: {}", p.display()))
}

/// Fixed reference instant so fixtures are reproducible.
#[must_use]
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("fixed timestamp is ambiguous"))
}

/// `base_time()` plus `minutes`.
#[must_use]
pub fn at_minute(minutes: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(minutes)
}

/// An active manifest with every not-yet-known field absent.
#[must_use]
pub fn active_manifest(trace_id: &str, agent_type: &str, started_at: DateTime<Utc>) -> Manifest {
    Manifest {
        trace_id: trace_id.to_string(),
        agent_type: agent_type.to_string(),
        session_id: "session-test".to_string(),
        project: "/work/project".to_string(),
        project_name: "project".to_string(),
        branch: "main".to_string(),
        start_commit: String::new(),
        end_commit: None,
        started_at,
        finished_at: None,
        duration_seconds: None,
        status: TraceStatus::Active,
        outcome: None,
        test_result: None,
        files_changed: None,
    }
}

/// Write a manifest into `{store}/{trace_id}/manifest.json` and create
/// `artifacts/`. Returns the trace directory.
pub fn write_trace_dir(store: &Utf8Path, manifest: &Manifest) -> Utf8PathBuf {
    let dir = store.join(&manifest.trace_id);
    fs::create_dir_all(dir.join("artifacts")).unwrap();
    let text = serde_json::to_string_pretty(manifest).unwrap();
    fs::write(dir.join("manifest.json"), text).unwrap();
    dir
}

/// Write `content` to `{trace_dir}/artifacts/{name}`.
pub fn write_artifact(trace_dir: &Utf8Path, name: &str, content: &str) {
    let artifacts = trace_dir.join("artifacts");
    fs::create_dir_all(&artifacts).unwrap();
    fs::write(artifacts.join(name), content).unwrap();
}

/// Write `{trace_dir}/compliance.json`.
pub fn write_compliance(trace_dir: &Utf8Path, record: &ComplianceRecord) {
    let text = serde_json::to_string_pretty(record).unwrap();
    fs::write(trace_dir.join("compliance.json"), text).unwrap();
}

/// History rows for one signal, one per minute starting at `start`.
#[must_use]
pub fn history_series(
    agent_type: &str,
    artifact: &str,
    start: DateTime<Utc>,
    rates: &[Option<f64>],
) -> Vec<HistoryRow> {
    rates
        .iter()
        .enumerate()
        .map(|(i, rate)| HistoryRow {
            ts: start + Duration::minutes(i as i64),
            agent_type: agent_type.to_string(),
            artifact: artifact.to_string(),
            rate: *rate,
            count: 10,
        })
        .collect()
}
