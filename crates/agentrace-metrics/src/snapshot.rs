use agentrace_utils::atomic_write::{JsonLayout, write_json_atomic};
use agentrace_utils::error::{AgentraceError, Result};
use agentrace_utils::types::MetricsSnapshot;
use camino::Utf8Path;
use std::fs;
use std::io;

/// Replace `metrics.json` with `snapshot`, canonically encoded.
pub fn write_snapshot(path: &Utf8Path, snapshot: &MetricsSnapshot) -> Result<()> {
    write_json_atomic(path, snapshot, JsonLayout::Canonical)?;
    Ok(())
}

/// Read `metrics.json`. Consumers need it to exist: absence is
/// [`AgentraceError::MissingFile`], not an empty snapshot.
pub fn load_snapshot(path: &Utf8Path) -> Result<MetricsSnapshot> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(AgentraceError::MissingFile {
                path: path.to_string(),
            });
        }
        Err(e) => return Err(AgentraceError::io(path, e)),
    };
    serde_json::from_str(&text).map_err(|e| AgentraceError::corrupt(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrace_utils::test_support::{base_time, utf8_path};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_snapshot_names_the_file() {
        let td = TempDir::new().unwrap();
        let path = utf8_path(&td).join("metrics.json");

        let err = load_snapshot(&path).unwrap_err();
        assert!(matches!(err, AgentraceError::MissingFile { .. }));
        assert!(err.to_string().contains("metrics.json"));
    }

    #[test]
    fn test_snapshot_is_canonical_on_disk() {
        let td = TempDir::new().unwrap();
        let path = utf8_path(&td).join("metrics.json");
        let snapshot = MetricsSnapshot {
            generated_at: base_time(),
            trace_count: 0,
            by_agent_type: BTreeMap::new(),
        };

        write_snapshot(&path, &snapshot).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            r#"{"by_agent_type":{},"generated_at":"2026-01-01T00:00:00Z","trace_count":0}"#
        );
        assert_eq!(load_snapshot(&path).unwrap(), snapshot);
    }

    #[test]
    fn test_truncated_snapshot_is_corrupt() {
        let td = TempDir::new().unwrap();
        let path = utf8_path(&td).join("metrics.json");
        fs::write(&path, "{\"trace_count\":").unwrap();
        assert!(load_snapshot(&path).unwrap_err().is_corruption());
    }
}
