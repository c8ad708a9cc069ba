use agentrace_config::{ComplianceSchema, Config, PathsConfig};
use agentrace_suggest::{Suggestion, SuggestionMachine};
use agentrace_trace::TraceStore;
use agentrace_utils::error::Result;
use agentrace_utils::logging::operation_span;
use agentrace_utils::types::{AgentMetrics, HistoryRow, Manifest, MetricsSnapshot, timestamp_now};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::compliance::{Tally, observe};
use crate::history::HistoryLog;
use crate::snapshot::write_snapshot;

/// Outcome key for traces that are still running.
pub const ACTIVE_OUTCOME: &str = "active";
/// Outcome key for finalized traces with no recorded outcome.
pub const UNKNOWN_OUTCOME: &str = "unknown";

/// Result of one `analyze` run.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub snapshot: MetricsSnapshot,
    pub history_rows: usize,
    /// Suggestions proposed from this snapshot.
    pub proposed: Vec<Suggestion>,
}

#[derive(Debug, Clone)]
pub struct MetricsAnalyzer {
    paths: PathsConfig,
    schema: ComplianceSchema,
}

impl MetricsAnalyzer {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            paths: config.paths.clone(),
            schema: config.compliance.clone(),
        }
    }

    #[must_use]
    pub fn history(&self) -> HistoryLog {
        HistoryLog::new(self.paths.history_file())
    }

    /// Aggregate the live store without writing anything.
    pub fn compute(&self, store: &TraceStore, now: DateTime<Utc>) -> Result<MetricsSnapshot> {
        let manifests = store.list_manifests()?;

        let mut groups: BTreeMap<&str, Vec<&Manifest>> = BTreeMap::new();
        for manifest in &manifests {
            groups.entry(manifest.agent_type.as_str()).or_default().push(manifest);
        }

        let mut by_agent_type = BTreeMap::new();
        for (agent_type, group) in groups {
            by_agent_type.insert(agent_type.to_string(), self.agent_metrics(store, agent_type, &group)?);
        }

        Ok(MetricsSnapshot {
            generated_at: now,
            trace_count: manifests.len() as u64,
            by_agent_type,
        })
    }

    fn agent_metrics(&self, store: &TraceStore, agent_type: &str, group: &[&Manifest]) -> Result<AgentMetrics> {
        let mut outcomes: BTreeMap<String, u64> = BTreeMap::new();
        let mut durations = Vec::new();
        let artifacts = self.schema.artifacts_for(agent_type);
        let mut tallies: Vec<Tally> = artifacts.iter().map(|_| Tally::default()).collect();

        for manifest in group {
            if manifest.is_active() {
                *outcomes.entry(ACTIVE_OUTCOME.to_string()).or_insert(0) += 1;
                continue;
            }

            let key = manifest
                .outcome
                .map_or_else(|| UNKNOWN_OUTCOME.to_string(), |o| o.to_string());
            *outcomes.entry(key).or_insert(0) += 1;
            if let Some(d) = manifest.duration_seconds {
                durations.push(d);
            }

            let record = store.load_compliance(&manifest.trace_id)?;
            for (artifact, tally) in artifacts.iter().zip(tallies.iter_mut()) {
                tally.record(observe(store.layout(), &manifest.trace_id, record.as_ref(), artifact));
            }
        }

        let avg_duration_s = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<i64>() as f64 / durations.len() as f64
        };

        Ok(AgentMetrics {
            count: group.len() as u64,
            outcomes,
            avg_duration_s,
            compliance: artifacts
                .iter()
                .cloned()
                .zip(tallies.into_iter().map(Tally::finish))
                .collect(),
        })
    }

    pub fn analyze(&self, store: &TraceStore, machine: &SuggestionMachine) -> Result<AnalysisReport> {
        self.analyze_at(store, machine, timestamp_now())
    }

    /// Write `metrics.json`, append history, then hand the snapshot to the
    /// suggestion machine. Nothing is written when aggregation fails.
    pub fn analyze_at(
        &self,
        store: &TraceStore,
        machine: &SuggestionMachine,
        now: DateTime<Utc>,
    ) -> Result<AnalysisReport> {
        let span = operation_span("analyze");
        let _guard = span.enter();

        let snapshot = self.compute(store, now)?;
        write_snapshot(&self.paths.metrics_file(), &snapshot)?;

        let rows = history_rows(&snapshot);
        self.history().append(&rows)?;
        tracing::info!(
            trace_count = snapshot.trace_count,
            agent_types = snapshot.by_agent_type.len(),
            history_rows = rows.len(),
            "metrics snapshot written"
        );

        let proposed = machine.generate_at(&snapshot, now)?;
        Ok(AnalysisReport {
            snapshot,
            history_rows: rows.len(),
            proposed,
        })
    }
}

/// One history row per `(agent_type, artifact)` in the snapshot.
#[must_use]
pub fn history_rows(snapshot: &MetricsSnapshot) -> Vec<HistoryRow> {
    snapshot
        .pairs()
        .map(|(agent_type, artifact, m)| HistoryRow {
            ts: snapshot.generated_at,
            agent_type: agent_type.to_string(),
            artifact: artifact.to_string(),
            rate: m.rate,
            count: m.observed(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrace_suggest::StateStore;
    use agentrace_trace::{MemoryMarkerStore, NoVcs};
    use agentrace_utils::test_support::{
        active_manifest, at_minute, utf8_path, write_artifact, write_compliance, write_trace_dir,
    };
    use agentrace_utils::types::{
        ArtifactCompliance, ArtifactSource, ComplianceRecord, Outcome, TestResult, TraceStatus,
    };
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _td: TempDir,
        root: Utf8PathBuf,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let td = TempDir::new().unwrap();
            let root = utf8_path(&td);
            let config = Config::builder()
                .store_root(root.join("traces"))
                .obs_dir(root.join("obs"))
                .compliance_artifacts(["summary.md", "test-output.txt"])
                .build()
                .unwrap();
            fs::create_dir_all(root.join("traces")).unwrap();
            Self { _td: td, root, config }
        }

        fn store(&self) -> TraceStore {
            TraceStore::with_parts(&self.config, Box::new(MemoryMarkerStore::new()), Box::new(NoVcs))
        }

        fn machine(&self) -> SuggestionMachine {
            SuggestionMachine::new(
                StateStore::new(self.config.paths.state_file.clone()),
                self.config.thresholds.compliance_threshold,
            )
        }

        fn finished(&self, id: &str, agent: &str, outcome: Outcome, duration: i64) -> Utf8PathBuf {
            let mut m = active_manifest(id, agent, at_minute(0));
            m.status = TraceStatus::Completed;
            m.outcome = Some(outcome);
            m.test_result = Some(TestResult::NotProvided);
            m.duration_seconds = Some(duration);
            m.finished_at = Some(at_minute(1));
            write_trace_dir(&self.root.join("traces"), &m)
        }
    }

    fn present(source: ArtifactSource) -> ArtifactCompliance {
        ArtifactCompliance {
            present: true,
            source: Some(source),
        }
    }

    #[test]
    fn test_compute_counts_sources_and_outcomes() {
        let fx = Fixture::new();
        let t1 = fx.finished("impl-1", "implementer", Outcome::Success, 100);
        write_compliance(
            &t1,
            &ComplianceRecord {
                artifacts: [
                    ("summary.md".to_string(), present(ArtifactSource::Agent)),
                    ("test-output.txt".to_string(), present(ArtifactSource::AutoCapture)),
                ]
                .into(),
                test_result: Some(TestResult::Pass),
                test_result_source: Some("agent".into()),
            },
        );
        let t2 = fx.finished("impl-2", "implementer", Outcome::Partial, 200);
        write_artifact(&t2, "summary.md", "done");
        write_trace_dir(
            &fx.root.join("traces"),
            &active_manifest("impl-3", "implementer", at_minute(2)),
        );

        let snap = fx.compute_snapshot();
        let agent = &snap.by_agent_type["implementer"];

        assert_eq!(snap.trace_count, 3);
        assert_eq!(agent.count, 3);
        assert_eq!(agent.outcomes["success"], 1);
        assert_eq!(agent.outcomes["partial"], 1);
        assert_eq!(agent.outcomes[ACTIVE_OUTCOME], 1);
        assert_eq!(agent.avg_duration_s, 150.0);

        let summary = &agent.compliance["summary.md"];
        assert_eq!((summary.agent, summary.auto, summary.missing), (2, 0, 0));
        assert_eq!(summary.rate, Some(1.0));

        let tests = &agent.compliance["test-output.txt"];
        assert_eq!((tests.agent, tests.auto, tests.missing), (0, 1, 1));
        assert_eq!(tests.rate, Some(0.5));
        assert_eq!(tests.root_causes.get("agent_fault"), Some(&1));
    }

    #[test]
    fn test_active_only_agent_has_null_rates() {
        let fx = Fixture::new();
        write_trace_dir(
            &fx.root.join("traces"),
            &active_manifest("rev-1", "reviewer", at_minute(0)),
        );

        let snap = fx.compute_snapshot();
        let reviewer = &snap.by_agent_type["reviewer"];
        assert!(reviewer.compliance.values().all(|m| m.rate.is_none()));
        assert_eq!(reviewer.avg_duration_s, 0.0);
    }

    #[test]
    fn test_archive_is_not_scanned() {
        let fx = Fixture::new();
        fx.finished("impl-1", "implementer", Outcome::Success, 10);
        let archived = active_manifest("impl-0", "implementer", at_minute(0));
        write_trace_dir(&fx.root.join("traces/oldTraces"), &archived);
        fs::create_dir_all(fx.root.join("traces/.markers")).unwrap();

        assert_eq!(fx.compute_snapshot().trace_count, 1);
    }

    #[test]
    fn test_analyze_writes_snapshot_history_and_suggestions() {
        let fx = Fixture::new();
        for i in 0..4 {
            let dir = fx.finished(&format!("impl-{i}"), "implementer", Outcome::Partial, 60);
            write_artifact(&dir, "summary.md", "done");
        }

        let analyzer = MetricsAnalyzer::new(&fx.config);
        let report = analyzer.analyze_at(&fx.store(), &fx.machine(), at_minute(10)).unwrap();

        assert!(fx.config.paths.metrics_file().is_file());
        assert_eq!(report.history_rows, 2);
        assert_eq!(analyzer.history().read_all().unwrap().len(), 2);

        let ids: Vec<_> = report.proposed.iter().filter_map(|s| s.signal_id.as_deref()).collect();
        assert_eq!(ids, ["implementer.test-output.txt"]);

        // Second run appends history but does not duplicate the suggestion.
        let again = analyzer.analyze_at(&fx.store(), &fx.machine(), at_minute(11)).unwrap();
        assert!(again.proposed.is_empty());
        assert_eq!(analyzer.history().read_all().unwrap().len(), 4);
    }

    #[test]
    fn test_corrupt_compliance_aborts_before_writing() {
        let fx = Fixture::new();
        let dir = fx.finished("impl-1", "implementer", Outcome::Partial, 60);
        fs::write(dir.join("compliance.json"), "{not json").unwrap();

        let analyzer = MetricsAnalyzer::new(&fx.config);
        let err = analyzer.analyze_at(&fx.store(), &fx.machine(), at_minute(5)).unwrap_err();

        assert!(err.is_corruption());
        assert!(!fx.config.paths.metrics_file().exists());
        assert!(!fx.config.paths.history_file().exists());
    }

    impl Fixture {
        fn compute_snapshot(&self) -> MetricsSnapshot {
            MetricsAnalyzer::new(&self.config)
                .compute(&self.store(), at_minute(30))
                .unwrap()
        }
    }
}
