use agentrace_utils::atomic_write::{JsonLayout, write_json_atomic};
use agentrace_utils::error::{AgentraceError, Result};
use agentrace_utils::types::timestamp_now;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;

use crate::migrate::{RawStateDocument, migrate};
use crate::model::{CURRENT_VERSION, StateDocument};

/// File-backed suggestion document.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: Utf8PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Load and migrate. A missing file is an empty current-version
    /// document; an unparseable one is an error and is never rewritten.
    pub fn load(&self) -> Result<StateDocument> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path, "no state document yet");
                return Ok(StateDocument::default());
            }
            Err(e) => return Err(AgentraceError::io(&self.path, e)),
        };
        if text.trim().is_empty() {
            return Err(AgentraceError::corrupt(&self.path, "empty document"));
        }

        let raw: RawStateDocument =
            serde_json::from_str(&text).map_err(|e| AgentraceError::corrupt(&self.path, e))?;
        let (doc, _migrated) = migrate(raw)?;
        Ok(doc)
    }

    /// Stamp `updated_at` and replace the file atomically.
    pub fn save(&self, doc: &mut StateDocument) -> Result<()> {
        doc.version = CURRENT_VERSION;
        doc.updated_at = Some(timestamp_now());
        write_json_atomic(&self.path, doc, JsonLayout::Pretty)?;
        Ok(())
    }
}
