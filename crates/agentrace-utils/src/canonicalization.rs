//! JCS (RFC 8785) canonical JSON emission.
//!
//! `metrics.json` is emitted canonically so two analyses over the same store
//! produce byte-identical snapshots apart from `generated_at`.

use anyhow::{Context, Result};
use serde::Serialize;

/// Emit a value as canonical JSON (sorted keys, no insignificant whitespace).
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}
