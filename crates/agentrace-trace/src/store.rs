use agentrace_config::{Config, Thresholds};
use agentrace_utils::atomic_write::{JsonLayout, write_json_atomic};
use agentrace_utils::error::{AgentraceError, Result, TraceError};
use agentrace_utils::logging::trace_span;
use agentrace_utils::types::{ComplianceRecord, Manifest, TraceStatus, timestamp_now};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::io;

use crate::id;
use crate::index;
use crate::layout::{FILES_CHANGED_ARTIFACT, TraceLayout, validate_trace_id};
use crate::marker::{FsMarkerStore, Marker, MarkerKey, MarkerStore, project_hash};
use crate::resolve::{self, TraceFacts};
use crate::vcs::{GitVcs, Vcs};

/// Session id recorded when the host does not provide one.
pub const UNKNOWN_SESSION: &str = "unknown";

/// What `finalize` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeResult {
    pub manifest: Manifest,
    /// The trace was already finalized; resolution was re-run instead.
    pub already_finalized: bool,
    /// The manifest on disk changed.
    pub changed: bool,
}

/// Owner of every trace directory under one store root.
pub struct TraceStore {
    layout: TraceLayout,
    markers: Box<dyn MarkerStore>,
    vcs: Box<dyn Vcs>,
    thresholds: Thresholds,
    session_id: Option<String>,
}

impl std::fmt::Debug for TraceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceStore")
            .field("root", &self.layout.root())
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl TraceStore {
    /// Store backed by the filesystem marker directory and `git`.
    #[must_use]
    pub fn open(config: &Config) -> Self {
        Self::with_parts(
            config,
            Box::new(FsMarkerStore::new(config.paths.marker_dir.clone())),
            Box::new(GitVcs::discover()),
        )
    }

    #[must_use]
    pub fn with_parts(config: &Config, markers: Box<dyn MarkerStore>, vcs: Box<dyn Vcs>) -> Self {
        Self {
            layout: TraceLayout::new(config.paths.store_root.clone()),
            markers,
            vcs,
            thresholds: config.thresholds,
            session_id: config.session_id.clone(),
        }
    }

    #[must_use]
    pub fn layout(&self) -> &TraceLayout {
        &self.layout
    }

    fn session(&self) -> &str {
        self.session_id.as_deref().unwrap_or(UNKNOWN_SESSION)
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    /// Load `{trace_id}/manifest.json`.
    pub fn load_manifest(&self, trace_id: &str) -> Result<Manifest> {
        validate_trace_id(trace_id)?;
        self.read_manifest(trace_id)?.ok_or_else(|| {
            TraceError::NotFound {
                trace_id: trace_id.to_string(),
            }
            .into()
        })
    }

    fn read_manifest(&self, trace_id: &str) -> Result<Option<Manifest>> {
        let path = self.layout.manifest(trace_id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AgentraceError::io(&path, e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| AgentraceError::corrupt(&path, e))
    }

    /// Every manifest in the store, ordered by `started_at` then id.
    ///
    /// Directories without a manifest are skipped; an unparseable manifest
    /// is an error.
    pub fn list_manifests(&self) -> Result<Vec<Manifest>> {
        let mut manifests = Vec::new();
        for trace_id in self.layout.list_trace_ids()? {
            match self.read_manifest(&trace_id)? {
                Some(m) => manifests.push(m),
                None => tracing::debug!(trace_id = %trace_id, "skipping directory without manifest"),
            }
        }
        manifests.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.trace_id.cmp(&b.trace_id))
        });
        Ok(manifests)
    }

    /// Compliance record for a trace; absence is `None`, corruption an error.
    pub fn load_compliance(&self, trace_id: &str) -> Result<Option<ComplianceRecord>> {
        let path = self.layout.compliance(trace_id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AgentraceError::io(&path, e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| AgentraceError::corrupt(&path, e))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn init(&self, project: &Utf8Path, agent_type: &str) -> Result<String> {
        self.init_at(project, agent_type, timestamp_now())
    }

    /// Create a trace for `agent_type` working on `project` and take the
    /// session marker for it.
    pub fn init_at(&self, project: &Utf8Path, agent_type: &str, now: DateTime<Utc>) -> Result<String> {
        let (trace_id, _dir) = id::allocate(&self.layout, agent_type, now)?;
        let _span = trace_span(&trace_id, agent_type).entered();

        let manifest = Manifest {
            trace_id: trace_id.clone(),
            agent_type: agent_type.to_string(),
            session_id: self.session().to_string(),
            project: project.to_string(),
            project_name: project
                .file_name()
                .map_or_else(|| project.to_string(), ToString::to_string),
            branch: self.vcs.current_branch(project).unwrap_or_default(),
            start_commit: self.vcs.head_revision(project).unwrap_or_default(),
            end_commit: None,
            started_at: now,
            finished_at: None,
            duration_seconds: None,
            status: TraceStatus::Active,
            outcome: None,
            test_result: None,
            files_changed: None,
        };
        write_json_atomic(&self.layout.manifest(&trace_id), &manifest, JsonLayout::Pretty)?;

        self.markers.put(&Marker {
            trace_id: trace_id.clone(),
            agent_type: agent_type.to_string(),
            session_id: manifest.session_id.clone(),
            project_hash: project_hash(project.as_str()),
            created_at: now,
        })?;

        let cutoff = now - Duration::seconds(self.thresholds.marker_stale_secs);
        self.markers.remove_older_than(cutoff)?;

        tracing::info!(trace_id = %trace_id, agent_type, project = %project, "trace started");
        Ok(trace_id)
    }

    /// Find the active trace owned by `agent_type` on `project`.
    ///
    /// With a known session only the exact marker is consulted. Without one,
    /// markers for the agent type are tried newest first and a candidate is
    /// accepted only when its manifest is active and records the marker's
    /// session and the requested project.
    pub fn detect_active(&self, project: &Utf8Path, agent_type: &str) -> Result<Option<String>> {
        let hash = project_hash(project.as_str());

        if let Some(session) = &self.session_id {
            let key = MarkerKey {
                agent_type: agent_type.to_string(),
                session_id: session.clone(),
                project_hash: hash,
            };
            let Some(marker) = self.markers.get(&key)? else {
                return Ok(None);
            };
            if marker.key() != key {
                tracing::warn!(trace_id = %marker.trace_id, session = %session, "marker belongs to another session");
                return Ok(None);
            }
            return Ok(self
                .read_manifest(&marker.trace_id)?
                .filter(|m| m.is_active() && m.session_id == *session)
                .map(|m| m.trace_id));
        }

        for marker in self.markers.list_for_agent(agent_type)? {
            if marker.project_hash != hash || validate_trace_id(&marker.trace_id).is_err() {
                continue;
            }
            let Some(manifest) = self.read_manifest(&marker.trace_id)? else {
                continue;
            };
            if manifest.is_active()
                && manifest.session_id == marker.session_id
                && manifest.project == project.as_str()
            {
                tracing::debug!(trace_id = %manifest.trace_id, "active trace found by marker scan");
                return Ok(Some(manifest.trace_id));
            }
        }
        Ok(None)
    }

    pub fn finalize(&self, trace_id: &str, project: &Utf8Path, agent_type: &str) -> Result<FinalizeResult> {
        self.finalize_at(trace_id, project, agent_type, timestamp_now())
    }

    /// Resolve outcome, test result, files changed and duration, write the
    /// manifest, release the marker and append an index row.
    ///
    /// On an already-finalized trace this behaves as [`refinalize`](Self::refinalize):
    /// `finished_at` is kept and no index row is appended.
    pub fn finalize_at(
        &self,
        trace_id: &str,
        project: &Utf8Path,
        agent_type: &str,
        now: DateTime<Utc>,
    ) -> Result<FinalizeResult> {
        let manifest = self.load_manifest(trace_id)?;
        let _span = trace_span(trace_id, agent_type).entered();

        if manifest.agent_type != agent_type {
            return Err(TraceError::AgentMismatch {
                trace_id: trace_id.to_string(),
                expected: agent_type.to_string(),
                actual: manifest.agent_type,
            }
            .into());
        }

        let key = MarkerKey {
            agent_type: agent_type.to_string(),
            session_id: manifest.session_id.clone(),
            project_hash: project_hash(project.as_str()),
        };

        if !manifest.is_active() {
            let (resolved, changed) = self.rerun_resolution(&manifest, project, now)?;
            self.release_markers(&key, trace_id)?;
            tracing::info!(trace_id, changed, "trace already finalized; re-ran resolution");
            return Ok(FinalizeResult {
                manifest: resolved,
                already_finalized: true,
                changed,
            });
        }

        let mut pending = manifest;
        pending.finished_at = Some(now);
        pending.end_commit = Some(self.vcs.head_revision(project).unwrap_or_default());

        let facts = self.gather_facts(&pending, project)?;
        let resolved = resolve::resolve(&pending, &facts, now, self.thresholds.timeout_secs);

        write_json_atomic(&self.layout.manifest(trace_id), &resolved, JsonLayout::Pretty)?;
        self.release_markers(&key, trace_id)?;
        index::append(&self.layout.index_file(), &resolved)?;

        tracing::info!(
            trace_id,
            outcome = ?resolved.outcome,
            test_result = ?resolved.test_result,
            files_changed = ?resolved.files_changed,
            duration_seconds = ?resolved.duration_seconds,
            "trace finalized"
        );

        Ok(FinalizeResult {
            manifest: resolved,
            already_finalized: false,
            changed: true,
        })
    }

    /// Re-run resolution on a finalized manifest. Returns whether the
    /// manifest changed; nothing is written when it did not.
    pub fn refinalize(&self, trace_id: &str) -> Result<bool> {
        let manifest = self.load_manifest(trace_id)?;
        if manifest.is_active() {
            tracing::warn!(trace_id, "refusing to refinalize an active trace");
            return Ok(false);
        }
        let project = Utf8PathBuf::from(&manifest.project);
        let (_, changed) = self.rerun_resolution(&manifest, &project, timestamp_now())?;
        Ok(changed)
    }

    /// Refinalize every finalized trace; returns the ids that changed.
    pub fn refinalize_all(&self) -> Result<Vec<String>> {
        let mut changed = Vec::new();
        for manifest in self.list_manifests()? {
            if !manifest.is_active() && self.refinalize(&manifest.trace_id)? {
                changed.push(manifest.trace_id);
            }
        }
        Ok(changed)
    }

    fn rerun_resolution(
        &self,
        manifest: &Manifest,
        project: &Utf8Path,
        now: DateTime<Utc>,
    ) -> Result<(Manifest, bool)> {
        let facts = self.gather_facts(manifest, project)?;
        let resolved = resolve::resolve(manifest, &facts, now, self.thresholds.timeout_secs);
        if &resolved == manifest {
            tracing::debug!(trace_id = %manifest.trace_id, "manifest already correct");
            return Ok((resolved, false));
        }
        write_json_atomic(&self.layout.manifest(&manifest.trace_id), &resolved, JsonLayout::Pretty)?;
        tracing::info!(trace_id = %manifest.trace_id, "manifest corrected");
        Ok((resolved, true))
    }

    fn gather_facts(&self, manifest: &Manifest, project: &Utf8Path) -> Result<TraceFacts> {
        let trace_id = manifest.trace_id.as_str();
        let compliance = self.load_compliance(trace_id)?;

        let files_changed_path = self.layout.artifact(trace_id, FILES_CHANGED_ARTIFACT);
        let artifact_files_changed = match fs::read_to_string(&files_changed_path) {
            Ok(text) => Some(text.lines().filter(|l| !l.trim().is_empty()).count() as u64),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(AgentraceError::io(&files_changed_path, e)),
        };

        let vcs_files_changed = if artifact_files_changed.is_some() {
            None
        } else {
            let end = manifest.end_commit.as_deref().unwrap_or_default();
            let start = Some(manifest.start_commit.as_str()).filter(|s| !s.is_empty());
            self.vcs.changed_files(project, start, end)
        };

        Ok(TraceFacts {
            compliance,
            artifact_files_changed,
            vcs_files_changed,
            has_artifacts: self.layout.has_artifacts(trace_id),
            has_summary: self.layout.has_summary(trace_id),
        })
    }

    fn release_markers(&self, key: &MarkerKey, trace_id: &str) -> Result<()> {
        self.markers.remove(key)?;
        self.markers.remove_for_trace(trace_id)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Rewrite the flat index with exactly one row per manifest.
    pub fn rebuild_index(&self) -> Result<usize> {
        let manifests = self.list_manifests()?;
        let count = index::rewrite(&self.layout.index_file(), &manifests)?;
        tracing::info!(rows = count, "index rebuilt");
        Ok(count)
    }

    /// Close out active traces whose owner vanished.
    ///
    /// Every active manifest started more than the trace staleness window
    /// before `now` gets `finished_at = now` (when absent), the finalize
    /// rules, `status = completed`, its markers removed and an index row.
    pub fn heal_stale(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let cutoff = now - Duration::seconds(self.thresholds.trace_stale_secs);
        let mut healed = Vec::new();

        for manifest in self.list_manifests()? {
            if !manifest.is_active() || manifest.started_at >= cutoff {
                continue;
            }
            let _span = trace_span(&manifest.trace_id, &manifest.agent_type).entered();
            let project = Utf8PathBuf::from(&manifest.project);

            let mut pending = manifest;
            if pending.finished_at.is_none() {
                pending.finished_at = Some(now);
            }
            if pending.end_commit.is_none() {
                pending.end_commit = Some(self.vcs.head_revision(&project).unwrap_or_default());
            }

            let facts = self.gather_facts(&pending, &project)?;
            let mut resolved = resolve::resolve(&pending, &facts, now, self.thresholds.timeout_secs);
            resolved.status = TraceStatus::Completed;

            write_json_atomic(&self.layout.manifest(&resolved.trace_id), &resolved, JsonLayout::Pretty)?;
            self.markers.remove_for_trace(&resolved.trace_id)?;
            index::append(&self.layout.index_file(), &resolved)?;

            tracing::warn!(
                trace_id = %resolved.trace_id,
                outcome = ?resolved.outcome,
                "healed stale active trace"
            );
            healed.push(resolved.trace_id);
        }

        Ok(healed)
    }

    /// Move finalized traces started before `cutoff` into the archive
    /// subtree, then rebuild the index. Active traces stay put.
    pub fn archive_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let archive = self.layout.archive_dir();
        let mut archived = Vec::new();

        for manifest in self.list_manifests()? {
            if manifest.is_active() || manifest.started_at >= cutoff {
                continue;
            }
            fs::create_dir_all(&archive).map_err(|e| AgentraceError::io(&archive, e))?;

            let from = self.layout.trace_dir(&manifest.trace_id);
            let to = archive.join(&manifest.trace_id);
            if to.exists() {
                tracing::warn!(trace_id = %manifest.trace_id, "archive already holds this trace; leaving it in place");
                continue;
            }
            fs::rename(&from, &to).map_err(|e| AgentraceError::io(&from, e))?;
            tracing::debug!(trace_id = %manifest.trace_id, "archived");
            archived.push(manifest.trace_id);
        }

        if !archived.is_empty() {
            tracing::info!(count = archived.len(), "traces archived");
        }
        self.rebuild_index()?;
        Ok(archived)
    }
}
