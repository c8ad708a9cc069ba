//! Path arithmetic for the trace store. No I/O beyond existence checks and
//! directory listing.

use agentrace_config::{ARCHIVE_DIR_NAME, ComplianceSchema, INDEX_FILE_NAME};
use agentrace_utils::error::{AgentraceError, Result, TraceError};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const COMPLIANCE_FILE: &str = "compliance.json";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const FILES_CHANGED_ARTIFACT: &str = "files-changed.txt";

#[derive(Debug, Clone)]
pub struct TraceLayout {
    root: Utf8PathBuf,
}

impl TraceLayout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    #[must_use]
    pub fn index_file(&self) -> Utf8PathBuf {
        self.root.join(INDEX_FILE_NAME)
    }

    #[must_use]
    pub fn archive_dir(&self) -> Utf8PathBuf {
        self.root.join(ARCHIVE_DIR_NAME)
    }

    #[must_use]
    pub fn trace_dir(&self, trace_id: &str) -> Utf8PathBuf {
        self.root.join(trace_id)
    }

    #[must_use]
    pub fn manifest(&self, trace_id: &str) -> Utf8PathBuf {
        self.trace_dir(trace_id).join(MANIFEST_FILE)
    }

    #[must_use]
    pub fn compliance(&self, trace_id: &str) -> Utf8PathBuf {
        self.trace_dir(trace_id).join(COMPLIANCE_FILE)
    }

    #[must_use]
    pub fn artifacts_dir(&self, trace_id: &str) -> Utf8PathBuf {
        self.trace_dir(trace_id).join(ARTIFACTS_DIR)
    }

    #[must_use]
    pub fn artifact(&self, trace_id: &str, name: &str) -> Utf8PathBuf {
        self.artifacts_dir(trace_id).join(name)
    }

    /// The agent's completion marker: `summary.*` at the trace root, or
    /// under `artifacts/`.
    #[must_use]
    pub fn find_summary(&self, trace_id: &str) -> Option<Utf8PathBuf> {
        [self.trace_dir(trace_id), self.artifacts_dir(trace_id)]
            .into_iter()
            .find_map(|dir| find_summary_in(&dir))
    }

    #[must_use]
    pub fn has_summary(&self, trace_id: &str) -> bool {
        self.find_summary(trace_id).is_some()
    }

    /// `artifacts/` exists and contains at least one entry.
    #[must_use]
    pub fn has_artifacts(&self, trace_id: &str) -> bool {
        fs::read_dir(self.artifacts_dir(trace_id))
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    #[must_use]
    pub fn artifacts_dir_exists(&self, trace_id: &str) -> bool {
        self.artifacts_dir(trace_id).is_dir()
    }

    /// Whether `artifact` is present on disk for a trace. Summary artifacts
    /// also match any `summary.*` at the trace root.
    #[must_use]
    pub fn artifact_present(&self, trace_id: &str, artifact: &str) -> bool {
        if self.artifact(trace_id, artifact).is_file() {
            return true;
        }
        ComplianceSchema::is_summary(artifact) && self.has_summary(trace_id)
    }

    /// Ids of every trace directory directly under the root, sorted.
    ///
    /// The archive subtree, dot-entries and plain files are excluded by name.
    pub fn list_trace_ids(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AgentraceError::io(&self.root, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AgentraceError::io(&self.root, e))?;
            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!(root = %self.root, "skipping non-UTF-8 store entry");
                continue;
            };
            if !is_trace_entry_name(&name) {
                continue;
            }
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn find_summary_in(dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut found: Vec<Utf8PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| Utf8PathBuf::from_path_buf(e.path()).ok())
        .filter(|p| p.is_file() && p.file_name().is_some_and(ComplianceSchema::is_summary))
        .collect();
    found.sort();
    found.into_iter().next()
}

/// Entries that can never be traces.
#[must_use]
pub fn is_trace_entry_name(name: &str) -> bool {
    !name.starts_with('.') && name != ARCHIVE_DIR_NAME && name != INDEX_FILE_NAME
}

/// Reject ids that would escape the store or collide with reserved names.
pub fn validate_trace_id(trace_id: &str) -> Result<()> {
    let reason = if trace_id.is_empty() {
        Some("empty")
    } else if trace_id.contains(['/', '\\']) {
        Some("contains a path separator")
    } else if !is_trace_entry_name(trace_id) {
        Some("reserved name")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(TraceError::InvalidTraceId {
            trace_id: trace_id.to_string(),
            reason: reason.to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrace_utils::test_support::utf8_path;
    use tempfile::TempDir;

    #[test]
    fn test_list_excludes_archive_and_dot_entries() {
        let td = TempDir::new().unwrap();
        let root = utf8_path(&td);
        for dir in ["b-trace", "a-trace", "oldTraces", ".markers"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        fs::write(root.join("index.jsonl"), "").unwrap();
        fs::write(root.join("stray.txt"), "").unwrap();

        let layout = TraceLayout::new(&root);
        assert_eq!(layout.list_trace_ids().unwrap(), vec!["a-trace", "b-trace"]);
    }

    #[test]
    fn test_list_missing_root_is_empty() {
        let td = TempDir::new().unwrap();
        let layout = TraceLayout::new(utf8_path(&td).join("absent"));
        assert!(layout.list_trace_ids().unwrap().is_empty());
    }

    #[test]
    fn test_summary_at_root_or_in_artifacts() {
        let td = TempDir::new().unwrap();
        let layout = TraceLayout::new(utf8_path(&td));
        fs::create_dir_all(layout.artifacts_dir("t1")).unwrap();
        fs::create_dir_all(layout.artifacts_dir("t2")).unwrap();
        fs::create_dir_all(layout.artifacts_dir("t3")).unwrap();

        fs::write(layout.trace_dir("t1").join("summary.txt"), "done").unwrap();
        fs::write(layout.artifact("t2", "summary.md"), "done").unwrap();

        assert!(layout.has_summary("t1"));
        assert!(layout.has_summary("t2"));
        assert!(!layout.has_summary("t3"));
        assert!(layout.artifact_present("t1", "summary.md"));
        assert!(!layout.artifact_present("t1", "diff.patch"));
    }

    #[test]
    fn test_has_artifacts_requires_entries() {
        let td = TempDir::new().unwrap();
        let layout = TraceLayout::new(utf8_path(&td));
        fs::create_dir_all(layout.artifacts_dir("t")).unwrap();
        assert!(layout.artifacts_dir_exists("t"));
        assert!(!layout.has_artifacts("t"));

        fs::write(layout.artifact("t", "diff.patch"), "").unwrap();
        assert!(layout.has_artifacts("t"));
    }

    #[test]
    fn test_validate_trace_id() {
        assert!(validate_trace_id("implementer-20260101-000000-abc123").is_ok());
        assert!(validate_trace_id("").is_err());
        assert!(validate_trace_id("../etc").is_err());
        assert!(validate_trace_id("oldTraces").is_err());
        assert!(validate_trace_id(".markers").is_err());
    }
}
