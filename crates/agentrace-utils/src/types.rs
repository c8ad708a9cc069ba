//! Shared data model for the trace store, metrics and suggestion documents.
//!
//! Fields whose value is not known yet are `Option` and serialize as `null`,
//! so "absent" and "present but zero/empty" stay distinguishable on disk.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumString};

/// Current UTC time truncated to whole seconds, the resolution of every
/// timestamp agentrace writes.
#[must_use]
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

// ============================================================================
// Trace manifest
// ============================================================================

/// Lifecycle status of a trace. Moves only `active -> completed | crashed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TraceStatus {
    Active,
    Completed,
    Crashed,
}

/// Classified result of an agent invocation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Outcome {
    Success,
    Partial,
    Failure,
    Timeout,
    Crashed,
    Skipped,
}

/// Test verdict attached to a trace.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TestResult {
    Pass,
    Fail,
    Unknown,
    NotProvided,
}

impl TestResult {
    /// Pass or fail; `unknown` and `not-provided` are unresolved.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Pass | Self::Fail)
    }
}

/// Per-trace metadata document (`{trace_id}/manifest.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub trace_id: String,
    pub agent_type: String,
    pub session_id: String,
    pub project: String,
    pub project_name: String,
    #[serde(default)]
    pub branch: String,
    /// Revision at init time; empty when the project is not under version control.
    #[serde(default)]
    pub start_commit: String,
    /// Revision at finalize time; `None` until finalized, empty without version control.
    #[serde(default)]
    pub end_commit: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    pub status: TraceStatus,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub test_result: Option<TestResult>,
    #[serde(default)]
    pub files_changed: Option<u64>,
}

impl Manifest {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TraceStatus::Active
    }
}

/// One line of the flat trace index (`index.jsonl`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRow {
    pub trace_id: String,
    pub agent_type: String,
    pub project_name: String,
    pub branch: String,
    pub status: TraceStatus,
    pub outcome: Option<Outcome>,
    pub test_result: Option<TestResult>,
    pub files_changed: Option<u64>,
    pub duration_seconds: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Manifest> for IndexRow {
    fn from(m: &Manifest) -> Self {
        Self {
            trace_id: m.trace_id.clone(),
            agent_type: m.agent_type.clone(),
            project_name: m.project_name.clone(),
            branch: m.branch.clone(),
            status: m.status,
            outcome: m.outcome,
            test_result: m.test_result,
            files_changed: m.files_changed,
            duration_seconds: m.duration_seconds,
            started_at: m.started_at,
            finished_at: m.finished_at,
        }
    }
}

// ============================================================================
// Compliance record
// ============================================================================

/// Who produced an artifact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum ArtifactSource {
    #[serde(rename = "agent")]
    #[strum(serialize = "agent")]
    Agent,
    #[serde(rename = "auto-capture")]
    #[strum(serialize = "auto-capture")]
    AutoCapture,
}

/// Compliance entry for a single artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCompliance {
    pub present: bool,
    #[serde(default)]
    pub source: Option<ArtifactSource>,
}

/// Per-trace compliance record (`{trace_id}/compliance.json`), written by an
/// external checker and read-only here.
///
/// On disk the artifact entries sit at the top level next to `test_result`:
///
/// ```json
/// {"summary.md": {"present": true, "source": "agent"},
///  "test-output.txt": {"present": false, "source": null},
///  "test_result": "pass", "test_result_source": "agent"}
/// ```
///
/// A nested `"artifacts": {...}` object is accepted as well. Top-level keys
/// whose value is not an object with a `present` field are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawComplianceRecord")]
pub struct ComplianceRecord {
    #[serde(flatten)]
    pub artifacts: BTreeMap<String, ArtifactCompliance>,
    #[serde(default)]
    pub test_result: Option<TestResult>,
    #[serde(default)]
    pub test_result_source: Option<String>,
}

#[derive(Deserialize)]
struct RawComplianceRecord {
    #[serde(default)]
    test_result: Option<TestResult>,
    #[serde(default)]
    test_result_source: Option<String>,
    #[serde(default)]
    artifacts: Option<BTreeMap<String, ArtifactCompliance>>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

impl TryFrom<RawComplianceRecord> for ComplianceRecord {
    type Error = String;

    fn try_from(raw: RawComplianceRecord) -> Result<Self, Self::Error> {
        let mut artifacts = raw.artifacts.unwrap_or_default();
        for (name, value) in raw.rest {
            let is_entry = value
                .as_object()
                .is_some_and(|obj| obj.contains_key("present"));
            if !is_entry {
                continue;
            }
            let entry: ArtifactCompliance = serde_json::from_value(value)
                .map_err(|e| format!("invalid compliance entry '{name}': {e}"))?;
            artifacts.insert(name, entry);
        }
        Ok(Self {
            artifacts,
            test_result: raw.test_result,
            test_result_source: raw.test_result_source,
        })
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Why an expected artifact is missing, checked in this order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RootCause {
    /// Artifacts directory and completion marker exist; the agent skipped this artifact.
    AgentFault,
    /// Artifacts directory exists but the agent never wrote its completion marker.
    AgentCrashed,
    /// No artifacts directory at all.
    NoTraceDir,
}

/// Compliance counts for one (agent type, artifact) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetrics {
    pub agent: u64,
    pub auto: u64,
    pub missing: u64,
    /// `(agent + auto) / (agent + auto + missing)`; `None` when nothing was observed.
    pub rate: Option<f64>,
    #[serde(default)]
    pub root_causes: BTreeMap<String, u64>,
}

impl ArtifactMetrics {
    #[must_use]
    pub fn observed(&self) -> u64 {
        self.agent + self.auto + self.missing
    }
}

/// Aggregates for one agent type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub count: u64,
    pub outcomes: BTreeMap<String, u64>,
    pub avg_duration_s: f64,
    pub compliance: BTreeMap<String, ArtifactMetrics>,
}

/// Point-in-time snapshot (`metrics.json`), regenerated wholesale on each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub trace_count: u64,
    pub by_agent_type: BTreeMap<String, AgentMetrics>,
}

impl MetricsSnapshot {
    /// Compliance rate for a pair, if the pair was observed.
    #[must_use]
    pub fn rate(&self, agent_type: &str, artifact: &str) -> Option<f64> {
        self.by_agent_type
            .get(agent_type)?
            .compliance
            .get(artifact)?
            .rate
    }

    /// Every `(agent_type, artifact, metrics)` triple, in key order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str, &ArtifactMetrics)> {
        self.by_agent_type.iter().flat_map(|(agent, m)| {
            m.compliance
                .iter()
                .map(move |(artifact, am)| (agent.as_str(), artifact.as_str(), am))
        })
    }
}

/// One line of `metrics-history.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub ts: DateTime<Utc>,
    pub agent_type: String,
    pub artifact: String,
    pub rate: Option<f64>,
    pub count: u64,
}

impl HistoryRow {
    #[must_use]
    pub fn signal_id(&self) -> String {
        signal_id(&self.agent_type, &self.artifact)
    }
}

/// Stable identifier of a compliance signal: `{agent_type}.{artifact}`.
#[must_use]
pub fn signal_id(agent_type: &str, artifact: &str) -> String {
    format!("{agent_type}.{artifact}")
}

/// Dotted metric path for a signal, e.g. `implementer.test-output.txt.rate`.
#[must_use]
pub fn metric_path(signal_id: &str) -> String {
    format!("{signal_id}.rate")
}

// ============================================================================
// Convergence verdicts
// ============================================================================

/// Verdict reached about an implemented suggestion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Verdict {
    /// Post-implementation cohort shows no material improvement.
    Ineffective,
    /// Metric improved and held above the threshold.
    Converged,
}

/// Cohort evaluation result for one suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortVerdict {
    pub suggestion_id: String,
    pub signal_id: Option<String>,
    pub metric: String,
    pub verdict: Verdict,
    pub baseline: f64,
    pub pre_count: usize,
    pub post_count: usize,
    pub improved_count: usize,
    pub improved_share: f64,
}
