//! Forward-only schema migration for the suggestion document.
//!
//! v1 stored `implemented` as bare suggestion ids. From v3 each entry is a
//! `{sug_id, signal_id, implemented_at}` record. Bare ids migrate with null
//! `signal_id` and `implemented_at`; that information was never recorded.
//! Suggestions keep whatever `signal_id` they carried, which for v1 is none.

use agentrace_utils::error::{Result, StateError};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{CURRENT_VERSION, ImplementedRecord, StateDocument, Suggestion};

/// Any document version this build can read.
#[derive(Debug, Deserialize)]
pub struct RawStateDocument {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub implemented: Vec<RawImplemented>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawImplemented {
    Id(String),
    Record(ImplementedRecord),
}

/// Bring `raw` up to the current version. Returns the document and whether
/// anything was migrated. Applying it to a current document is a no-op.
pub fn migrate(raw: RawStateDocument) -> Result<(StateDocument, bool)> {
    let version = raw.version.unwrap_or(1);
    if version > CURRENT_VERSION {
        return Err(StateError::UnsupportedVersion { version }.into());
    }

    let mut migrated = version < CURRENT_VERSION;

    let implemented = raw
        .implemented
        .into_iter()
        .map(|entry| match entry {
            RawImplemented::Id(sug_id) => {
                migrated = true;
                ImplementedRecord {
                    sug_id,
                    signal_id: None,
                    implemented_at: None,
                }
            }
            RawImplemented::Record(record) => record,
        })
        .collect();

    if migrated {
        tracing::info!(from = version, to = CURRENT_VERSION, "migrated suggestion state document");
    }

    Ok((
        StateDocument {
            version: CURRENT_VERSION,
            updated_at: raw.updated_at,
            suggestions: raw.suggestions,
            implemented,
        },
        migrated,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrace_utils::error::AgentraceError;

    fn parse(json: &str) -> RawStateDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_v1_bare_ids_become_null_records() {
        let (doc, migrated) = migrate(parse(r#"{"version": 1, "implemented": ["SUG-001"]}"#)).unwrap();

        assert!(migrated);
        assert_eq!(doc.version, 3);
        assert_eq!(
            doc.implemented,
            vec![ImplementedRecord {
                sug_id: "SUG-001".into(),
                signal_id: None,
                implemented_at: None,
            }]
        );
    }

    #[test]
    fn test_missing_version_is_v1() {
        let (doc, migrated) = migrate(parse(r#"{"implemented": ["SUG-004"]}"#)).unwrap();
        assert!(migrated);
        assert_eq!(doc.implemented[0].sug_id, "SUG-004");
    }

    #[test]
    fn test_migration_is_idempotent() {
        let (once, _) = migrate(parse(
            r#"{"version": 1, "implemented": ["SUG-001"],
                "suggestions": [{"id": "SUG-001", "metric": "tester.summary.md.rate", "status": "implemented"}]}"#,
        ))
        .unwrap();
        assert_eq!(once.suggestions[0].signal_id, None);

        let text = serde_json::to_string(&once).unwrap();
        let (twice, migrated) = migrate(parse(&text)).unwrap();

        assert!(!migrated);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_mixed_entries_keep_records() {
        let (doc, _) = migrate(parse(
            r#"{"version": 2, "implemented": [
                "SUG-001",
                {"sug_id": "SUG-002", "signal_id": "a.b", "implemented_at": "2026-01-01T00:00:00Z"}
            ]}"#,
        ))
        .unwrap();
        assert!(doc.implemented[0].implemented_at.is_none());
        assert_eq!(doc.implemented[1].signal_id.as_deref(), Some("a.b"));
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let err = migrate(parse(r#"{"version": 4}"#)).unwrap_err();
        assert!(matches!(
            err,
            AgentraceError::State(StateError::UnsupportedVersion { version: 4 })
        ));
    }
}
