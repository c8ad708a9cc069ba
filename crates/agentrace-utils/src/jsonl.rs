//! Append-only JSON Lines files (`index.jsonl`, `metrics-history.jsonl`).
//!
//! Each record is serialized to a single line and written with one `write_all`
//! on an `O_APPEND` handle, so concurrent appenders never interleave inside a
//! line. Reading treats a missing file as empty and any unparseable line as
//! corruption of the whole file.

use camino::Utf8Path;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};

use crate::error::{AgentraceError, Result};

/// Append one record as a single line.
pub fn append_json_line<T: Serialize>(path: &Utf8Path, record: &T) -> Result<()> {
    append_json_lines(path, std::slice::from_ref(record))
}

/// Append several records; the whole batch is written with one call.
pub fn append_json_lines<T: Serialize>(path: &Utf8Path, records: &[T]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let mut buf = String::new();
    for record in records {
        let line = serde_json::to_string(record).map_err(|e| AgentraceError::write_rejected(path, e))?;
        if line.contains('\n') {
            return Err(AgentraceError::write_rejected(path, "record serialized across lines"));
        }
        buf.push_str(&line);
        buf.push('\n');
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AgentraceError::io(parent, e))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AgentraceError::io(path, e))?;
    file.write_all(buf.as_bytes())
        .map_err(|e| AgentraceError::io(path, e))?;

    Ok(())
}

/// Read every record. A missing file yields an empty vector; blank lines are skipped.
pub fn read_json_lines<T: DeserializeOwned>(path: &Utf8Path) -> Result<Vec<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AgentraceError::io(path, e)),
    };

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .map_err(|e| AgentraceError::corrupt(path, format!("line {}: {e}", idx + 1)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        key: String,
        value: Option<f64>,
    }

    fn path_in(td: &TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(td.path().join(name)).unwrap()
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let td = TempDir::new().unwrap();
        let rows: Vec<Row> = read_json_lines(&path_in(&td, "nope.jsonl")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_append_preserves_order() {
        let td = TempDir::new().unwrap();
        let path = path_in(&td, "log.jsonl");

        append_json_line(&path, &Row { key: "a".into(), value: Some(0.5) }).unwrap();
        append_json_lines(
            &path,
            &[
                Row { key: "b".into(), value: None },
                Row { key: "c".into(), value: Some(1.0) },
            ],
        )
        .unwrap();

        let rows: Vec<Row> = read_json_lines(&path).unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(rows[1].value, None);
    }

    #[test]
    fn test_corrupt_line_is_an_error_with_line_number() {
        let td = TempDir::new().unwrap();
        let path = path_in(&td, "log.jsonl");
        fs::write(&path, "{\"key\":\"a\",\"value\":1.0}\nnot json\n").unwrap();

        let err = read_json_lines::<Row>(&path).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let td = TempDir::new().unwrap();
        let path = path_in(&td, "log.jsonl");
        fs::write(&path, "\n{\"key\":\"a\",\"value\":null}\n\n").unwrap();

        let rows: Vec<Row> = read_json_lines(&path).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
