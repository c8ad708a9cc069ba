//! Flat trace index (`index.jsonl`): one [`IndexRow`] per line.
//!
//! Finalize appends; `rebuild` replaces the whole file atomically with
//! exactly one row per manifest.

use agentrace_utils::atomic_write::write_file_atomic;
use agentrace_utils::error::{AgentraceError, Result};
use agentrace_utils::jsonl::{append_json_line, read_json_lines};
use agentrace_utils::types::{IndexRow, Manifest};
use camino::Utf8Path;

pub fn append(path: &Utf8Path, manifest: &Manifest) -> Result<()> {
    append_json_line(path, &IndexRow::from(manifest))
}

/// Replace the index with one row per manifest, in the given order.
pub fn rewrite(path: &Utf8Path, manifests: &[Manifest]) -> Result<usize> {
    let mut content = String::new();
    for manifest in manifests {
        let line = serde_json::to_string(&IndexRow::from(manifest))
            .map_err(|e| AgentraceError::write_rejected(path, e))?;
        content.push_str(&line);
        content.push('\n');
    }
    write_file_atomic(path, &content)?;
    Ok(manifests.len())
}

pub fn read(path: &Utf8Path) -> Result<Vec<IndexRow>> {
    read_json_lines(path)
}
