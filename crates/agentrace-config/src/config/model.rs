use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::ConfigSource;

/// Pairs whose compliance rate falls below this fraction get a suggestion.
pub const DEFAULT_COMPLIANCE_THRESHOLD: f64 = 0.60;

/// Trend slopes within `±` this value are classified flat.
pub const DEFAULT_SLOPE_BAND: f64 = 0.05;

/// Number of trailing history rows a trend looks at.
pub const DEFAULT_TREND_WINDOW: usize = 5;

/// Minimum post-implementation rows before a cohort verdict is reached.
pub const DEFAULT_COHORT_MIN_POINTS: usize = 10;

/// A fix is ineffective when fewer than this share of post rows improved.
pub const DEFAULT_IMPROVED_SHARE: f64 = 0.50;

/// Runs longer than this with an unresolved test verdict are timeouts.
pub const DEFAULT_TIMEOUT_SECS: i64 = 600;

/// Markers older than this are deleted on the next `init`.
pub const DEFAULT_MARKER_STALE_SECS: i64 = 600;

/// Active traces older than this are healed.
pub const DEFAULT_TRACE_STALE_SECS: i64 = 600;

/// Artifacts every agent is expected to leave behind unless overridden.
pub const DEFAULT_ARTIFACTS: &[&str] = &[
    "summary.md",
    "test-output.txt",
    "diff.patch",
    "files-changed.txt",
];

/// Directory name (under the store root) that holds archived traces.
pub const ARCHIVE_DIR_NAME: &str = "oldTraces";

/// Flat index file name (under the store root).
pub const INDEX_FILE_NAME: &str = "index.jsonl";

/// Snapshot file name (under the observatory directory).
pub const METRICS_FILE_NAME: &str = "metrics.json";

/// History log file name (under the observatory directory).
pub const HISTORY_FILE_NAME: &str = "metrics-history.jsonl";

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    pub thresholds: Thresholds,
    pub compliance: ComplianceSchema,
    /// Session of the calling agent, when the host provides one.
    pub session_id: Option<String>,
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
    pub store_root: Utf8PathBuf,
    pub obs_dir: Utf8PathBuf,
    pub state_file: Utf8PathBuf,
    pub marker_dir: Utf8PathBuf,
}

impl PathsConfig {
    /// Paths with the derived defaults: `state.json` in the observatory and
    /// `.markers/` under the store root.
    #[must_use]
    pub fn new(store_root: impl Into<Utf8PathBuf>, obs_dir: impl Into<Utf8PathBuf>) -> Self {
        let store_root = store_root.into();
        let obs_dir = obs_dir.into();
        Self {
            state_file: obs_dir.join("state.json"),
            marker_dir: store_root.join(".markers"),
            store_root,
            obs_dir,
        }
    }

    #[must_use]
    pub fn index_file(&self) -> Utf8PathBuf {
        self.store_root.join(INDEX_FILE_NAME)
    }

    #[must_use]
    pub fn archive_dir(&self) -> Utf8PathBuf {
        self.store_root.join(ARCHIVE_DIR_NAME)
    }

    #[must_use]
    pub fn metrics_file(&self) -> Utf8PathBuf {
        self.obs_dir.join(METRICS_FILE_NAME)
    }

    #[must_use]
    pub fn history_file(&self) -> Utf8PathBuf {
        self.obs_dir.join(HISTORY_FILE_NAME)
    }
}

/// Named, overridable thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub compliance_threshold: f64,
    pub slope_band: f64,
    pub trend_window: usize,
    pub cohort_min_points: usize,
    pub improved_share: f64,
    pub timeout_secs: i64,
    pub marker_stale_secs: i64,
    pub trace_stale_secs: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            compliance_threshold: DEFAULT_COMPLIANCE_THRESHOLD,
            slope_band: DEFAULT_SLOPE_BAND,
            trend_window: DEFAULT_TREND_WINDOW,
            cohort_min_points: DEFAULT_COHORT_MIN_POINTS,
            improved_share: DEFAULT_IMPROVED_SHARE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            marker_stale_secs: DEFAULT_MARKER_STALE_SECS,
            trace_stale_secs: DEFAULT_TRACE_STALE_SECS,
        }
    }
}

/// Which artifacts each agent type is expected to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSchema {
    /// Expected artifacts for agent types without an override.
    pub artifacts: Vec<String>,
    /// Per-agent-type replacement lists.
    #[serde(default)]
    pub agents: BTreeMap<String, Vec<String>>,
}

impl Default for ComplianceSchema {
    fn default() -> Self {
        Self {
            artifacts: DEFAULT_ARTIFACTS.iter().map(ToString::to_string).collect(),
            agents: BTreeMap::new(),
        }
    }
}

impl ComplianceSchema {
    /// Expected artifacts for `agent_type`.
    #[must_use]
    pub fn artifacts_for(&self, agent_type: &str) -> &[String] {
        self.agents
            .get(agent_type)
            .map_or(self.artifacts.as_slice(), Vec::as_slice)
    }

    /// Summary artifacts may also live at the trace root as `summary.*`.
    #[must_use]
    pub fn is_summary(artifact: &str) -> bool {
        Utf8Path::new(artifact)
            .file_stem()
            .is_some_and(|stem| stem == "summary")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_derive_state_and_markers() {
        let paths = PathsConfig::new("/data/traces", "/data/obs");
        assert_eq!(paths.state_file, "/data/obs/state.json");
        assert_eq!(paths.marker_dir, "/data/traces/.markers");
        assert_eq!(paths.index_file(), "/data/traces/index.jsonl");
        assert_eq!(paths.archive_dir(), "/data/traces/oldTraces");
        assert_eq!(paths.metrics_file(), "/data/obs/metrics.json");
        assert_eq!(paths.history_file(), "/data/obs/metrics-history.jsonl");
    }

    #[test]
    fn test_schema_overrides_per_agent() {
        let mut schema = ComplianceSchema::default();
        schema
            .agents
            .insert("reviewer".into(), vec!["summary.md".into()]);

        assert_eq!(schema.artifacts_for("reviewer"), ["summary.md".to_string()]);
        assert_eq!(schema.artifacts_for("implementer").len(), 4);
    }

    #[test]
    fn test_summary_detection() {
        assert!(ComplianceSchema::is_summary("summary.md"));
        assert!(ComplianceSchema::is_summary("summary.txt"));
        assert!(!ComplianceSchema::is_summary("diff.patch"));
        assert!(!ComplianceSchema::is_summary("summary-old.md"));
    }
}
