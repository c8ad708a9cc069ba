//! Finalize-time resolution rules. Pure functions over already-gathered
//! facts so finalize, refinalize and healing share one definition.

use agentrace_utils::types::{ComplianceRecord, Manifest, Outcome, TestResult, TraceStatus};
use chrono::{DateTime, Utc};

/// Facts about a trace directory gathered before resolution.
#[derive(Debug, Clone, Default)]
pub struct TraceFacts {
    pub compliance: Option<ComplianceRecord>,
    /// Line count of `artifacts/files-changed.txt`, if the file exists.
    pub artifact_files_changed: Option<u64>,
    /// Changed-file count reported by version control, if available.
    pub vcs_files_changed: Option<u64>,
    pub has_artifacts: bool,
    pub has_summary: bool,
}

/// Compliance verdict when recorded, otherwise `not-provided`.
#[must_use]
pub fn resolve_test_result(compliance: Option<&ComplianceRecord>) -> TestResult {
    compliance
        .and_then(|c| c.test_result)
        .unwrap_or(TestResult::NotProvided)
}

/// The artifact count wins over the VCS diff. With neither, a previously
/// resolved count is kept; zero only when nothing was ever known.
#[must_use]
pub fn resolve_files_changed(artifact: Option<u64>, vcs: Option<u64>, recorded: Option<u64>) -> u64 {
    artifact.or(vcs).or(recorded).unwrap_or(0)
}

/// Keep a recorded non-negative duration, otherwise recompute from the timestamps.
#[must_use]
pub fn resolve_duration(
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    recorded: Option<i64>,
) -> i64 {
    match recorded {
        Some(d) if d >= 0 => d,
        _ => (finished_at - started_at).num_seconds().max(0),
    }
}

/// First matching rule wins:
/// no artifacts at all -> skipped; test pass -> success; over the timeout
/// with an unresolved test -> timeout; no summary -> crashed; else partial.
#[must_use]
pub fn classify_outcome(
    has_artifacts: bool,
    has_summary: bool,
    test_result: TestResult,
    duration_seconds: i64,
    timeout_secs: i64,
) -> Outcome {
    if !has_artifacts && !has_summary {
        Outcome::Skipped
    } else if test_result == TestResult::Pass {
        Outcome::Success
    } else if duration_seconds > timeout_secs && !test_result.is_resolved() {
        Outcome::Timeout
    } else if !has_summary {
        Outcome::Crashed
    } else {
        Outcome::Partial
    }
}

/// Apply every rule to `manifest`, producing the finalized document.
///
/// `finished_at` must already be set by the caller for a first finalize;
/// when absent, `now` is used. The status becomes `completed` unless it was
/// already terminal.
#[must_use]
pub fn resolve(manifest: &Manifest, facts: &TraceFacts, now: DateTime<Utc>, timeout_secs: i64) -> Manifest {
    let mut out = manifest.clone();
    let finished_at = out.finished_at.unwrap_or(now);
    out.finished_at = Some(finished_at);

    let test_result = resolve_test_result(facts.compliance.as_ref());
    let duration = resolve_duration(out.started_at, finished_at, out.duration_seconds);

    out.test_result = Some(test_result);
    out.files_changed = Some(resolve_files_changed(
        facts.artifact_files_changed,
        facts.vcs_files_changed,
        manifest.files_changed,
    ));
    out.duration_seconds = Some(duration);
    out.outcome = Some(classify_outcome(
        facts.has_artifacts,
        facts.has_summary,
        test_result,
        duration,
        timeout_secs,
    ));
    if out.status == TraceStatus::Active {
        out.status = TraceStatus::Completed;
    }
    if out.end_commit.is_none() {
        out.end_commit = Some(String::new());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrace_utils::test_support::{active_manifest, at_minute};

    fn record(result: TestResult) -> ComplianceRecord {
        ComplianceRecord {
            test_result: Some(result),
            ..ComplianceRecord::default()
        }
    }

    #[test]
    fn test_missing_compliance_is_not_provided() {
        assert_eq!(resolve_test_result(None), TestResult::NotProvided);
        assert_eq!(
            resolve_test_result(Some(&ComplianceRecord::default())),
            TestResult::NotProvided
        );
        assert_eq!(resolve_test_result(Some(&record(TestResult::Fail))), TestResult::Fail);
    }

    #[test]
    fn test_artifact_count_beats_vcs() {
        assert_eq!(resolve_files_changed(Some(3), Some(7), None), 3);
        assert_eq!(resolve_files_changed(None, Some(7), None), 7);
        assert_eq!(resolve_files_changed(Some(0), Some(7), None), 0);
        assert_eq!(resolve_files_changed(None, None, None), 0);
    }

    #[test]
    fn test_unavailable_vcs_keeps_resolved_count() {
        assert_eq!(resolve_files_changed(None, None, Some(9)), 9);
        assert_eq!(resolve_files_changed(None, Some(4), Some(9)), 4);
        assert_eq!(resolve_files_changed(Some(2), None, Some(9)), 2);
    }

    #[test]
    fn test_negative_duration_is_recomputed() {
        assert_eq!(resolve_duration(at_minute(0), at_minute(2), Some(-5)), 120);
        assert_eq!(resolve_duration(at_minute(0), at_minute(2), None), 120);
        assert_eq!(resolve_duration(at_minute(0), at_minute(2), Some(30)), 30);
        assert_eq!(resolve_duration(at_minute(5), at_minute(2), None), 0);
    }

    #[test]
    fn test_outcome_rules_in_order() {
        use Outcome::*;
        use TestResult::*;
        assert_eq!(classify_outcome(false, false, Pass, 10, 600), Skipped);
        assert_eq!(classify_outcome(true, false, Pass, 10, 600), Success);
        assert_eq!(classify_outcome(true, true, NotProvided, 900, 600), Timeout);
        assert_eq!(classify_outcome(true, true, Unknown, 900, 600), Timeout);
        assert_eq!(classify_outcome(true, true, Fail, 900, 600), Partial);
        assert_eq!(classify_outcome(true, false, Fail, 10, 600), Crashed);
        assert_eq!(classify_outcome(true, true, Fail, 10, 600), Partial);
        assert_eq!(classify_outcome(false, true, NotProvided, 10, 600), Partial);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut m = active_manifest("t", "implementer", at_minute(0));
        m.finished_at = Some(at_minute(3));
        let facts = TraceFacts {
            compliance: Some(record(TestResult::Pass)),
            artifact_files_changed: Some(2),
            vcs_files_changed: None,
            has_artifacts: true,
            has_summary: true,
        };

        let once = resolve(&m, &facts, at_minute(10), 600);
        let twice = resolve(&once, &facts, at_minute(20), 600);

        assert_eq!(once, twice);
        assert_eq!(once.status, TraceStatus::Completed);
        assert_eq!(once.outcome, Some(Outcome::Success));
        assert_eq!(once.duration_seconds, Some(180));
        assert_eq!(once.files_changed, Some(2));
    }
}
