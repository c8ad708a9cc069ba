//! Atomic file replacement, the only durability primitive agentrace relies on.
//!
//! Every mutating write (manifests, the flat index, `metrics.json`, the
//! suggestion state document) goes through this module:
//! - content is written to a temporary file in the target directory and fsynced
//! - JSON documents are validated (non-empty, parses back into its type) *before*
//!   the swap, so a bad serialization never replaces a good file
//! - the temporary file is renamed over the target
//! - Windows gets a bounded rename retry (≤ 250ms total)
//! - a cross-filesystem rename falls back to copy→fsync→replace

use camino::Utf8Path;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{AgentraceError, Result};

#[cfg(target_os = "windows")]
use std::{thread, time::Duration};

/// Result of an atomic write operation
#[derive(Debug, Clone, Default)]
pub struct AtomicWriteResult {
    /// Number of rename retries that occurred (Windows only)
    pub rename_retry_count: u32,
    /// Whether cross-filesystem fallback was used
    pub used_cross_filesystem_fallback: bool,
    /// Any warnings generated during the operation
    pub warnings: Vec<String>,
}

/// How a JSON document is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonLayout {
    /// Indented, trailing newline. Used for documents people read and edit.
    Pretty,
    /// JCS (RFC 8785) canonical form for stable diffs.
    Canonical,
}

/// Atomically write content to a file using temp file + fsync + rename.
///
/// The parent directory is created if missing. On any failure before the
/// rename the target is untouched.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult> {
    let mut result = AtomicWriteResult::default();

    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent).map_err(|e| AgentraceError::io(parent, e))?;

    let mut temp_file = NamedTempFile::new_in(parent).map_err(|e| AgentraceError::io(parent, e))?;

    temp_file
        .write_all(content.as_bytes())
        .and_then(|()| temp_file.as_file().sync_all())
        .map_err(|e| AgentraceError::io(temp_file.path().display(), e))?;

    let temp_path = temp_file.path().to_path_buf();

    match atomic_rename(temp_file, path.as_std_path()) {
        Ok(retry_count) => {
            result.rename_retry_count = retry_count;
            if retry_count > 0 {
                result.warnings.push(format!(
                    "Rename required {retry_count} retries due to transient filesystem locks"
                ));
            }
        }
        Err(e) if is_cross_filesystem_error(&e) => {
            result.used_cross_filesystem_fallback = true;
            result
                .warnings
                .push("Used cross-filesystem fallback (copy→fsync→replace)".to_string());
            cross_filesystem_copy_from_path(&temp_path, path)?;
        }
        Err(e) => return Err(AgentraceError::io(path, e)),
    }

    Ok(result)
}

/// Serialize `value`, validate the serialization, then replace `path` atomically.
///
/// Validation rejects an empty document and any document that does not parse
/// back into `T`. A rejected document yields [`AgentraceError::WriteRejected`]
/// and the file on disk is left exactly as it was.
pub fn write_json_atomic<T>(path: &Utf8Path, value: &T, layout: JsonLayout) -> Result<AtomicWriteResult>
where
    T: Serialize + DeserializeOwned,
{
    let text = match layout {
        JsonLayout::Pretty => serde_json::to_string_pretty(value)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .map_err(|e| AgentraceError::write_rejected(path, e))?,
        JsonLayout::Canonical => {
            crate::canonicalization::emit_jcs(value).map_err(|e| AgentraceError::write_rejected(path, e))?
        }
    };

    validate_json_document::<T>(&text).map_err(|reason| AgentraceError::write_rejected(path, reason))?;

    write_file_atomic(path, &text)
}

/// Check that `text` is a non-empty JSON document that deserializes into `T`.
pub fn validate_json_document<T: DeserializeOwned>(text: &str) -> std::result::Result<(), String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err("serialized document is empty".to_string());
    }
    serde_json::from_str::<T>(trimmed)
        .map(|_| ())
        .map_err(|e| format!("serialized document does not parse back: {e}"))
}

/// Attempt atomic rename with platform-specific retry logic.
///
/// Returns the number of retries that were needed.
#[cfg(target_os = "windows")]
fn atomic_rename(mut temp_file: NamedTempFile, target: &Path) -> io::Result<u32> {
    const MAX_RETRIES: u32 = 5;
    const INITIAL_DELAY_MS: u64 = 10;
    const MAX_TOTAL_DELAY_MS: u64 = 250;

    let mut retry_count = 0;
    let mut total_delay_ms = 0;

    loop {
        match temp_file.persist(target) {
            Ok(_) => return Ok(retry_count),
            Err(persist_error) => {
                let retryable = matches!(
                    persist_error.error.kind(),
                    io::ErrorKind::PermissionDenied | io::ErrorKind::Other
                );
                let delay_ms = INITIAL_DELAY_MS * 2_u64.pow(retry_count);
                if !retryable
                    || retry_count >= MAX_RETRIES
                    || total_delay_ms + delay_ms > MAX_TOTAL_DELAY_MS
                {
                    return Err(persist_error.error);
                }

                thread::sleep(Duration::from_millis(delay_ms));
                total_delay_ms += delay_ms;
                retry_count += 1;
                temp_file = persist_error.file;
            }
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn atomic_rename(temp_file: NamedTempFile, target: &Path) -> io::Result<u32> {
    temp_file.persist(target).map(|_| 0).map_err(|e| e.error)
}

#[cfg(unix)]
fn is_cross_filesystem_error(err: &io::Error) -> bool {
    // EXDEV on Linux/macOS
    err.raw_os_error() == Some(18)
}

#[cfg(windows)]
fn is_cross_filesystem_error(_err: &io::Error) -> bool {
    false
}

/// copy→fsync→replace for a temp file that could not be renamed across filesystems.
fn cross_filesystem_copy_from_path(temp_path: &Path, target: &Utf8Path) -> Result<()> {
    let content = fs::read(temp_path).map_err(|e| AgentraceError::io(temp_path.display(), e))?;

    let target_dir = target.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut target_temp =
        NamedTempFile::new_in(target_dir).map_err(|e| AgentraceError::io(target_dir, e))?;

    target_temp
        .write_all(&content)
        .and_then(|()| target_temp.as_file().sync_all())
        .map_err(|e| AgentraceError::io(target, e))?;

    target_temp
        .persist(target.as_std_path())
        .map_err(|e| AgentraceError::io(target, e.error))?;

    let _ = fs::remove_file(temp_path);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        version: u32,
        name: String,
    }

    fn utf8_dir(td: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_atomic_write_basic() {
        let td = TempDir::new().unwrap();
        let path = utf8_dir(&td).join("test.txt");

        let result = write_file_atomic(&path, "line one\nline two").unwrap();

        assert_eq!(result.rename_retry_count, 0);
        assert!(!result.used_cross_filesystem_fallback);
        assert!(result.warnings.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "line one\nline two");
    }

    #[test]
    fn test_atomic_write_creates_parent_directory() {
        let td = TempDir::new().unwrap();
        let path = utf8_dir(&td).join("nested").join("dir").join("test.txt");

        write_file_atomic(&path, "content").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "content");
    }

    #[test]
    fn test_atomic_write_overwrites_existing() {
        let td = TempDir::new().unwrap();
        let path = utf8_dir(&td).join("overwrite.txt");

        write_file_atomic(&path, "initial").unwrap();
        write_file_atomic(&path, "replacement").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "replacement");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let td = TempDir::new().unwrap();
        let dir = utf8_dir(&td);
        write_file_atomic(&dir.join("a.json"), "{}").unwrap();

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_json_pretty_round_trips() {
        let td = TempDir::new().unwrap();
        let path = utf8_dir(&td).join("doc.json");
        let doc = Doc {
            version: 3,
            name: "state".into(),
        };

        write_json_atomic(&path, &doc, JsonLayout::Pretty).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(serde_json::from_str::<Doc>(&text).unwrap(), doc);
    }

    #[test]
    fn test_write_json_canonical_sorts_keys() {
        let td = TempDir::new().unwrap();
        let path = utf8_dir(&td).join("doc.json");
        let doc = Doc {
            version: 1,
            name: "x".into(),
        };

        write_json_atomic(&path, &doc, JsonLayout::Canonical).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"name":"x","version":1}"#);
    }

    #[test]
    fn test_rejected_document_leaves_original_untouched() {
        let td = TempDir::new().unwrap();
        let path = utf8_dir(&td).join("doc.json");
        fs::write(&path, r#"{"version":1,"name":"good"}"#).unwrap();

        // A unit value serializes to `null`, which validation rejects as empty.
        #[derive(Serialize, Deserialize)]
        struct Empty;
        let err = write_json_atomic(&path, &Empty, JsonLayout::Pretty).unwrap_err();

        assert!(matches!(err, AgentraceError::WriteRejected { .. }));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"{"version":1,"name":"good"}"#
        );
    }

    #[test]
    fn test_validate_json_document() {
        assert!(validate_json_document::<Doc>(r#"{"version":1,"name":"a"}"#).is_ok());
        assert!(validate_json_document::<Doc>("").is_err());
        assert!(validate_json_document::<Doc>("   \n").is_err());
        assert!(validate_json_document::<Doc>(r#"{"version":"one"}"#).is_err());
    }
}
