//! Session-scoped ownership markers.
//!
//! A marker records which trace a given (agent type, session, project) is
//! currently writing to. Markers are disposable: losing one only means the
//! owning trace is found by the fallback scan or healed later. A marker file
//! that cannot be parsed is never deleted here; only the stale sweep removes
//! markers, and only readable ones.

use agentrace_utils::atomic_write::{JsonLayout, write_json_atomic};
use agentrace_utils::error::{AgentraceError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::sync::Mutex;

/// First 12 hex characters of the BLAKE3 hash of the project path.
#[must_use]
pub fn project_hash(project: &str) -> String {
    let hash = blake3::hash(project.as_bytes()).to_hex();
    hash[..12].to_string()
}

/// File-name digest of an `(agent type, session)` pair. Hashing keeps
/// distinct sessions in distinct files whatever characters they contain.
fn slot_digest(agent_type: &str, session_id: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(agent_type.as_bytes());
    hasher.update(&[0]);
    hasher.update(session_id.as_bytes());
    hasher.finalize().to_hex()[..32].to_string()
}

/// Identity of a marker slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerKey {
    pub agent_type: String,
    pub session_id: String,
    pub project_hash: String,
}

impl MarkerKey {
    pub fn new(agent_type: &str, session_id: &str, project: &str) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            session_id: session_id.to_string(),
            project_hash: project_hash(project),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub trace_id: String,
    pub agent_type: String,
    pub session_id: String,
    pub project_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Marker {
    #[must_use]
    pub fn key(&self) -> MarkerKey {
        MarkerKey {
            agent_type: self.agent_type.clone(),
            session_id: self.session_id.clone(),
            project_hash: self.project_hash.clone(),
        }
    }
}

/// Storage for markers, injected into the trace store.
pub trait MarkerStore: Send + Sync {
    /// Create or replace the marker for its key.
    fn put(&self, marker: &Marker) -> Result<()>;

    fn get(&self, key: &MarkerKey) -> Result<Option<Marker>>;

    /// Every marker for an agent type, newest first.
    fn list_for_agent(&self, agent_type: &str) -> Result<Vec<Marker>>;

    /// Removing an absent marker is not an error.
    fn remove(&self, key: &MarkerKey) -> Result<()>;

    /// Remove every marker pointing at `trace_id`; returns how many were removed.
    fn remove_for_trace(&self, trace_id: &str) -> Result<usize>;

    /// Remove markers created before `cutoff`; returns how many were removed.
    fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// One JSON file per key under a marker directory.
#[derive(Debug, Clone)]
pub struct FsMarkerStore {
    dir: Utf8PathBuf,
}

impl FsMarkerStore {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    fn path_for(&self, key: &MarkerKey) -> Utf8PathBuf {
        // The readable agent prefix is for humans; the digest is the identity.
        self.dir.join(format!(
            "{}--{}--{}.json",
            sanitize(&key.agent_type),
            slot_digest(&key.agent_type, &key.session_id),
            key.project_hash
        ))
    }

    fn entries(&self) -> Result<Vec<Utf8PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AgentraceError::io(&self.dir, e)),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AgentraceError::io(&self.dir, e))?;
            if let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) {
                out.push(path);
            }
        }
        Ok(out)
    }

    /// Every readable marker with its file path. Unparseable marker files are
    /// reported and left in place.
    fn scan(&self) -> Result<Vec<(Utf8PathBuf, Marker)>> {
        let mut out = Vec::new();
        for path in self.entries()? {
            if path.extension() != Some("json") {
                continue;
            }
            match read_marker(&path) {
                Ok(Some(marker)) => out.push((path, marker)),
                Ok(None) => {}
                Err(e) if e.is_corruption() => {
                    tracing::warn!(marker = %path, error = %e, "skipping unreadable marker; left on disk");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Leftovers of removals whose final delete failed (`*.stale.<pid>`).
    fn sweep_leftovers(&self) -> Result<usize> {
        let mut swept = 0;
        for path in self.entries()? {
            if !path.file_name().is_some_and(|n| n.contains(".stale.")) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => swept += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "could not remove marker leftover");
                }
            }
        }
        Ok(swept)
    }
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn read_marker(path: &Utf8Path) -> Result<Option<Marker>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AgentraceError::io(path, e)),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| AgentraceError::corrupt(path, e))
}

/// Rename to a unique stale name, then delete. A concurrent remover losing
/// the race sees `NotFound`, which counts as success.
fn remove_marker_file(path: &Utf8Path) -> Result<bool> {
    let stale = path.with_extension(format!("stale.{}", std::process::id()));
    match fs::rename(path, &stale) {
        Ok(()) => {
            match fs::remove_file(&stale) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %stale, error = %e, "marker renamed but not deleted; the next sweep retries");
                }
            }
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AgentraceError::io(path, e)),
    }
}

impl MarkerStore for FsMarkerStore {
    fn put(&self, marker: &Marker) -> Result<()> {
        write_json_atomic(&self.path_for(&marker.key()), marker, JsonLayout::Pretty)?;
        Ok(())
    }

    /// An unparseable file in the slot is a `Corrupt` error. A readable
    /// marker whose recorded identity differs from `key` is not returned.
    fn get(&self, key: &MarkerKey) -> Result<Option<Marker>> {
        let path = self.path_for(key);
        let Some(marker) = read_marker(&path)? else {
            return Ok(None);
        };
        if marker.key() != *key {
            tracing::warn!(
                marker = %path,
                recorded_session = %marker.session_id,
                requested_session = %key.session_id,
                "marker records a different owner; ignoring"
            );
            return Ok(None);
        }
        Ok(Some(marker))
    }

    fn list_for_agent(&self, agent_type: &str) -> Result<Vec<Marker>> {
        let mut markers: Vec<Marker> = self
            .scan()?
            .into_iter()
            .map(|(_, m)| m)
            .filter(|m| m.agent_type == agent_type)
            .collect();
        markers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.trace_id.cmp(&a.trace_id)));
        Ok(markers)
    }

    fn remove(&self, key: &MarkerKey) -> Result<()> {
        remove_marker_file(&self.path_for(key)).map(|_| ())
    }

    fn remove_for_trace(&self, trace_id: &str) -> Result<usize> {
        let mut removed = 0;
        for (path, marker) in self.scan()? {
            if marker.trace_id == trace_id && remove_marker_file(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for (path, marker) in self.scan()? {
            if marker.created_at < cutoff && remove_marker_file(&path)? {
                removed += 1;
            }
        }
        let leftovers = self.sweep_leftovers()?;
        if removed > 0 || leftovers > 0 {
            tracing::debug!(removed, leftovers, dir = %self.dir, "removed stale markers");
        }
        Ok(removed)
    }
}

/// In-memory marker store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    markers: Mutex<BTreeMap<MarkerKey, Marker>>,
}

impl MemoryMarkerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut BTreeMap<MarkerKey, Marker>) -> T) -> T {
        let mut guard = self.markers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.with(|m| m.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn put(&self, marker: &Marker) -> Result<()> {
        self.with(|m| m.insert(marker.key(), marker.clone()));
        Ok(())
    }

    fn get(&self, key: &MarkerKey) -> Result<Option<Marker>> {
        Ok(self.with(|m| m.get(key).cloned()))
    }

    fn list_for_agent(&self, agent_type: &str) -> Result<Vec<Marker>> {
        let mut markers: Vec<Marker> = self.with(|m| {
            m.values()
                .filter(|marker| marker.agent_type == agent_type)
                .cloned()
                .collect()
        });
        markers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.trace_id.cmp(&a.trace_id)));
        Ok(markers)
    }

    fn remove(&self, key: &MarkerKey) -> Result<()> {
        self.with(|m| m.remove(key));
        Ok(())
    }

    fn remove_for_trace(&self, trace_id: &str) -> Result<usize> {
        Ok(self.with(|m| {
            let before = m.len();
            m.retain(|_, marker| marker.trace_id != trace_id);
            before - m.len()
        }))
    }

    fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(self.with(|m| {
            let before = m.len();
            m.retain(|_, marker| marker.created_at >= cutoff);
            before - m.len()
        }))
    }
}
