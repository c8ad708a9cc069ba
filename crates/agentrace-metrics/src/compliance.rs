//! Per-artifact compliance classification and root-cause attribution.

use agentrace_trace::TraceLayout;
use agentrace_utils::types::{ArtifactMetrics, ArtifactSource, ComplianceRecord, RootCause};

/// What one trace tells us about one expected artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Agent,
    Auto,
    Missing(RootCause),
}

/// Classify `artifact` for a finalized trace.
///
/// The compliance record wins when it has an entry for the artifact. Without
/// one, presence falls back to the file on disk and counts as agent-produced.
/// An entry marked present with no source also counts as agent-produced.
#[must_use]
pub fn observe(
    layout: &TraceLayout,
    trace_id: &str,
    record: Option<&ComplianceRecord>,
    artifact: &str,
) -> Observation {
    let present = match record.and_then(|r| r.artifacts.get(artifact)) {
        Some(entry) if entry.present => {
            return match entry.source {
                Some(ArtifactSource::AutoCapture) => Observation::Auto,
                Some(ArtifactSource::Agent) | None => Observation::Agent,
            };
        }
        Some(_) => false,
        None => layout.artifact_present(trace_id, artifact),
    };

    if present {
        Observation::Agent
    } else {
        Observation::Missing(root_cause(layout, trace_id))
    }
}

/// Tiered in order: agent_fault, agent_crashed, no_trace_dir.
#[must_use]
pub fn root_cause(layout: &TraceLayout, trace_id: &str) -> RootCause {
    if !layout.artifacts_dir_exists(trace_id) {
        RootCause::NoTraceDir
    } else if layout.has_summary(trace_id) {
        RootCause::AgentFault
    } else {
        RootCause::AgentCrashed
    }
}

/// Running tally for one `(agent_type, artifact)` pair.
#[derive(Debug, Default)]
pub struct Tally {
    metrics: ArtifactMetrics,
}

impl Tally {
    pub fn record(&mut self, observation: Observation) {
        match observation {
            Observation::Agent => self.metrics.agent += 1,
            Observation::Auto => self.metrics.auto += 1,
            Observation::Missing(cause) => {
                self.metrics.missing += 1;
                *self
                    .metrics
                    .root_causes
                    .entry(cause.as_ref().to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    /// Close the tally. `rate` stays `None` when nothing was observed.
    #[must_use]
    pub fn finish(mut self) -> ArtifactMetrics {
        let observed = self.metrics.observed();
        self.metrics.rate = (observed > 0)
            .then(|| (self.metrics.agent + self.metrics.auto) as f64 / observed as f64);
        self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrace_utils::test_support::{active_manifest, base_time, utf8_path, write_artifact, write_trace_dir};
    use agentrace_utils::types::ArtifactCompliance;
    use std::fs;
    use tempfile::TempDir;

    fn record(entries: &[(&str, bool, Option<ArtifactSource>)]) -> ComplianceRecord {
        ComplianceRecord {
            artifacts: entries
                .iter()
                .map(|(name, present, source)| {
                    (
                        name.to_string(),
                        ArtifactCompliance {
                            present: *present,
                            source: *source,
                        },
                    )
                })
                .collect(),
            test_result: None,
            test_result_source: None,
        }
    }

    #[test]
    fn test_record_source_decides() {
        let td = TempDir::new().unwrap();
        let layout = TraceLayout::new(utf8_path(&td));
        let rec = record(&[
            ("summary.md", true, Some(ArtifactSource::Agent)),
            ("diff.patch", true, Some(ArtifactSource::AutoCapture)),
            ("test-output.txt", true, None),
        ]);

        assert_eq!(observe(&layout, "t1", Some(&rec), "summary.md"), Observation::Agent);
        assert_eq!(observe(&layout, "t1", Some(&rec), "diff.patch"), Observation::Auto);
        assert_eq!(observe(&layout, "t1", Some(&rec), "test-output.txt"), Observation::Agent);
    }

    #[test]
    fn test_record_absent_entry_overrides_disk() {
        let td = TempDir::new().unwrap();
        let root = utf8_path(&td);
        let dir = write_trace_dir(&root, &active_manifest("t1", "implementer", base_time()));
        write_artifact(&dir, "diff.patch", "+x");
        let layout = TraceLayout::new(root);
        let rec = record(&[("diff.patch", false, None)]);

        assert_eq!(
            observe(&layout, "t1", Some(&rec), "diff.patch"),
            Observation::Missing(RootCause::AgentCrashed)
        );
    }

    #[test]
    fn test_disk_fallback_without_record() {
        let td = TempDir::new().unwrap();
        let root = utf8_path(&td);
        let dir = write_trace_dir(&root, &active_manifest("t1", "implementer", base_time()));
        fs::write(dir.join("summary.txt"), "done").unwrap();
        let layout = TraceLayout::new(root);

        assert_eq!(observe(&layout, "t1", None, "summary.md"), Observation::Agent);
        assert_eq!(
            observe(&layout, "t1", None, "diff.patch"),
            Observation::Missing(RootCause::AgentFault)
        );
    }

    #[test]
    fn test_root_cause_tiers() {
        let td = TempDir::new().unwrap();
        let root = utf8_path(&td);
        let layout = TraceLayout::new(root.clone());

        fs::create_dir_all(root.join("bare")).unwrap();
        assert_eq!(root_cause(&layout, "bare"), RootCause::NoTraceDir);

        fs::create_dir_all(root.join("bare/artifacts")).unwrap();
        assert_eq!(root_cause(&layout, "bare"), RootCause::AgentCrashed);

        write_artifact(&root.join("bare"), "summary.md", "ok");
        assert_eq!(root_cause(&layout, "bare"), RootCause::AgentFault);
    }

    #[test]
    fn test_tally_rate_and_causes() {
        let mut tally = Tally::default();
        tally.record(Observation::Agent);
        tally.record(Observation::Auto);
        tally.record(Observation::Missing(RootCause::AgentFault));
        tally.record(Observation::Missing(RootCause::AgentFault));

        let m = tally.finish();
        assert_eq!((m.agent, m.auto, m.missing), (1, 1, 2));
        assert_eq!(m.rate, Some(0.5));
        assert_eq!(m.root_causes.get("agent_fault"), Some(&2));
    }

    #[test]
    fn test_empty_tally_has_no_rate() {
        assert_eq!(Tally::default().finish().rate, None);
    }
}
