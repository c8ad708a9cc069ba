use agentrace_config::Config;
use agentrace_utils::error::{Result, StateError};
use agentrace_utils::types::{CohortVerdict, MetricsSnapshot, metric_path, signal_id, timestamp_now};
use chrono::{DateTime, Utc};

use crate::model::{ImplementedRecord, StateDocument, Suggestion, SuggestionStatus};
use crate::store::StateStore;

/// Proposes, tracks and re-evaluates process fixes against the state document.
#[derive(Debug, Clone)]
pub struct SuggestionMachine {
    store: StateStore,
    threshold: f64,
}

impl SuggestionMachine {
    pub fn new(store: StateStore, compliance_threshold: f64) -> Self {
        Self {
            store,
            threshold: compliance_threshold,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            StateStore::new(config.paths.state_file.clone()),
            config.thresholds.compliance_threshold,
        )
    }

    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn load(&self) -> Result<StateDocument> {
        self.store.load()
    }

    pub fn list(&self) -> Result<Vec<Suggestion>> {
        Ok(self.store.load()?.suggestions)
    }

    pub fn get(&self, id: &str) -> Result<Suggestion> {
        self.store
            .load()?
            .get(id)
            .cloned()
            .ok_or_else(|| StateError::UnknownSuggestion { id: id.to_string() }.into())
    }

    /// Human-readable check attached to every suggestion.
    #[must_use]
    pub fn convergence_check(&self) -> String {
        format!("rate >= {:.2}", self.threshold)
    }

    pub fn generate(&self, snapshot: &MetricsSnapshot) -> Result<Vec<Suggestion>> {
        self.generate_at(snapshot, timestamp_now())
    }

    /// Propose a fix for every pair below the threshold whose signal has no
    /// blocking suggestion. Returns the new suggestions; the document is only
    /// written when there is at least one.
    pub fn generate_at(&self, snapshot: &MetricsSnapshot, now: DateTime<Utc>) -> Result<Vec<Suggestion>> {
        let mut doc = self.store.load()?;
        let mut created = Vec::new();

        for (agent_type, artifact, metrics) in snapshot.pairs() {
            let Some(rate) = metrics.rate else {
                continue;
            };
            if rate >= self.threshold {
                continue;
            }
            let signal = signal_id(agent_type, artifact);
            if doc.is_blocked(&signal) {
                tracing::debug!(signal_id = %signal, rate, "below threshold but already tracked");
                continue;
            }

            let suggestion = Suggestion {
                id: doc.next_id(),
                metric: metric_path(&signal),
                metric_value_at_suggestion: Some(rate),
                title: format!(
                    "Raise {artifact} compliance for {agent_type} ({:.0}% < {:.0}%)",
                    rate * 100.0,
                    self.threshold * 100.0
                ),
                convergence_check: self.convergence_check(),
                status: SuggestionStatus::Proposed,
                suggested_at: Some(now),
                implemented_at: None,
                converged_at: None,
                signal_id: Some(signal.clone()),
            };
            tracing::info!(
                suggestion_id = %suggestion.id,
                signal_id = %signal,
                rate,
                "suggestion proposed"
            );
            doc.suggestions.push(suggestion.clone());
            created.push(suggestion);
        }

        if !created.is_empty() {
            self.store.save(&mut doc)?;
        }
        Ok(created)
    }

    pub fn transition(&self, id: &str, to: SuggestionStatus) -> Result<Suggestion> {
        self.transition_at(id, to, timestamp_now())
    }

    /// Move a suggestion along the state table and persist.
    ///
    /// Entering `implemented` stamps `implemented_at` and appends to the
    /// implemented ledger; entering `converged` stamps `converged_at`.
    pub fn transition_at(&self, id: &str, to: SuggestionStatus, now: DateTime<Utc>) -> Result<Suggestion> {
        let mut doc = self.store.load()?;
        let updated = apply_transition(&mut doc, id, to, now)?;
        self.store.save(&mut doc)?;
        tracing::info!(
            suggestion_id = %id,
            signal_id = ?updated.signal_id,
            status = %to,
            "suggestion transitioned"
        );
        Ok(updated)
    }

    /// Pipeline step after convergence: record the verdicts, then propose
    /// fixes for every signal that is eligible again.
    pub fn suggest(&self, snapshot: &MetricsSnapshot, verdicts: &[CohortVerdict]) -> Result<Vec<Suggestion>> {
        self.suggest_at(snapshot, verdicts, timestamp_now())
    }

    pub fn suggest_at(
        &self,
        snapshot: &MetricsSnapshot,
        verdicts: &[CohortVerdict],
        now: DateTime<Utc>,
    ) -> Result<Vec<Suggestion>> {
        for verdict in verdicts {
            tracing::info!(
                suggestion_id = %verdict.suggestion_id,
                signal_id = ?verdict.signal_id,
                verdict = %verdict.verdict,
                improved_share = verdict.improved_share,
                post_count = verdict.post_count,
                "cohort verdict"
            );
        }
        self.generate_at(snapshot, now)
    }
}

/// Validate against the table and mutate `doc` in memory.
pub fn apply_transition(
    doc: &mut StateDocument,
    id: &str,
    to: SuggestionStatus,
    now: DateTime<Utc>,
) -> Result<Suggestion> {
    let suggestion = doc
        .get_mut(id)
        .ok_or_else(|| StateError::UnknownSuggestion { id: id.to_string() })?;

    if !suggestion.status.can_transition_to(to) {
        return Err(StateError::InvalidTransition {
            id: id.to_string(),
            from: suggestion.status.to_string(),
            to: to.to_string(),
        }
        .into());
    }

    suggestion.status = to;
    match to {
        SuggestionStatus::Implemented => suggestion.implemented_at = Some(now),
        SuggestionStatus::Converged => suggestion.converged_at = Some(now),
        _ => {}
    }
    let updated = suggestion.clone();

    if to == SuggestionStatus::Implemented {
        doc.implemented.push(ImplementedRecord {
            sug_id: updated.id.clone(),
            signal_id: updated.signal_id.clone(),
            implemented_at: Some(now),
        });
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrace_utils::error::AgentraceError;
    use agentrace_utils::test_support::{at_minute, base_time, utf8_path};
    use agentrace_utils::types::{AgentMetrics, ArtifactMetrics, Verdict};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn snapshot(rates: &[(&str, &str, Option<f64>)]) -> MetricsSnapshot {
        let mut by_agent_type: BTreeMap<String, AgentMetrics> = BTreeMap::new();
        for (agent, artifact, rate) in rates {
            by_agent_type
                .entry(agent.to_string())
                .or_default()
                .compliance
                .insert(
                    artifact.to_string(),
                    ArtifactMetrics {
                        rate: *rate,
                        ..ArtifactMetrics::default()
                    },
                );
        }
        MetricsSnapshot {
            generated_at: base_time(),
            trace_count: 0,
            by_agent_type,
        }
    }

    fn machine(td: &TempDir) -> SuggestionMachine {
        SuggestionMachine::new(StateStore::new(utf8_path(td).join("state.json")), 0.60)
    }

    #[test]
    fn test_generate_only_below_threshold() {
        let td = TempDir::new().unwrap();
        let m = machine(&td);
        let snap = snapshot(&[
            ("implementer", "summary.md", Some(0.9)),
            ("implementer", "test-output.txt", Some(0.4)),
            ("tester", "diff.patch", None),
            ("tester", "summary.md", Some(0.60)),
        ]);

        let created = m.generate_at(&snap, at_minute(0)).unwrap();

        assert_eq!(created.len(), 1);
        let s = &created[0];
        assert_eq!(s.id, "SUG-001");
        assert_eq!(s.signal_id.as_deref(), Some("implementer.test-output.txt"));
        assert_eq!(s.metric, "implementer.test-output.txt.rate");
        assert_eq!(s.metric_value_at_suggestion, Some(0.4));
        assert_eq!(s.convergence_check, "rate >= 0.60");
        assert_eq!(s.status, SuggestionStatus::Proposed);
    }

    #[test]
    fn test_generate_is_idempotent_per_signal() {
        let td = TempDir::new().unwrap();
        let m = machine(&td);
        let snap = snapshot(&[("implementer", "summary.md", Some(0.2))]);

        assert_eq!(m.generate_at(&snap, at_minute(0)).unwrap().len(), 1);
        assert!(m.generate_at(&snap, at_minute(1)).unwrap().is_empty());
        assert_eq!(m.list().unwrap().len(), 1);
    }

    #[test]
    fn test_ineffective_reopens_with_same_signal() {
        let td = TempDir::new().unwrap();
        let m = machine(&td);
        let snap = snapshot(&[("implementer", "summary.md", Some(0.2))]);
        m.generate_at(&snap, at_minute(0)).unwrap();
        m.transition_at("SUG-001", SuggestionStatus::Implemented, at_minute(1)).unwrap();
        assert!(m.generate_at(&snap, at_minute(2)).unwrap().is_empty());

        m.transition_at("SUG-001", SuggestionStatus::Ineffective, at_minute(3)).unwrap();
        let reopened = m.generate_at(&snap, at_minute(4)).unwrap();

        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened[0].id, "SUG-002");
        assert_eq!(reopened[0].signal_id.as_deref(), Some("implementer.summary.md"));
    }

    #[test]
    fn test_rejected_and_deferred_block() {
        let td = TempDir::new().unwrap();
        let m = machine(&td);
        let snap = snapshot(&[("a", "x", Some(0.1)), ("b", "y", Some(0.1))]);
        m.generate_at(&snap, at_minute(0)).unwrap();
        m.transition("SUG-001", SuggestionStatus::Rejected).unwrap();
        m.transition("SUG-002", SuggestionStatus::Deferred).unwrap();

        assert!(m.generate_at(&snap, at_minute(1)).unwrap().is_empty());

        m.transition("SUG-002", SuggestionStatus::Proposed).unwrap();
        assert_eq!(m.get("SUG-002").unwrap().status, SuggestionStatus::Proposed);
    }

    #[test]
    fn test_implemented_stamps_and_ledger() {
        let td = TempDir::new().unwrap();
        let m = machine(&td);
        m.generate_at(&snapshot(&[("a", "x", Some(0.1))]), at_minute(0)).unwrap();

        let s = m.transition_at("SUG-001", SuggestionStatus::Implemented, at_minute(5)).unwrap();
        assert_eq!(s.implemented_at, Some(at_minute(5)));

        let doc = m.load().unwrap();
        assert_eq!(
            doc.implemented,
            vec![ImplementedRecord {
                sug_id: "SUG-001".into(),
                signal_id: Some("a.x".into()),
                implemented_at: Some(at_minute(5)),
            }]
        );

        let s = m.transition_at("SUG-001", SuggestionStatus::Converged, at_minute(9)).unwrap();
        assert_eq!(s.converged_at, Some(at_minute(9)));
    }

    #[test]
    fn test_invalid_transition_leaves_document_unchanged() {
        let td = TempDir::new().unwrap();
        let m = machine(&td);
        m.generate_at(&snapshot(&[("a", "x", Some(0.1))]), at_minute(0)).unwrap();
        let before = std::fs::read_to_string(m.store().path()).unwrap();

        let err = m.transition("SUG-001", SuggestionStatus::Converged).unwrap_err();
        assert!(matches!(err, AgentraceError::State(StateError::InvalidTransition { .. })));
        let err = m.transition("SUG-404", SuggestionStatus::Rejected).unwrap_err();
        assert!(matches!(err, AgentraceError::State(StateError::UnknownSuggestion { .. })));

        assert_eq!(std::fs::read_to_string(m.store().path()).unwrap(), before);
    }

    #[test]
    fn test_suggest_runs_generate() {
        let td = TempDir::new().unwrap();
        let m = machine(&td);
        let verdict = CohortVerdict {
            suggestion_id: "SUG-009".into(),
            signal_id: Some("a.x".into()),
            metric: "a.x.rate".into(),
            verdict: Verdict::Ineffective,
            baseline: 0.2,
            pre_count: 3,
            post_count: 12,
            improved_count: 0,
            improved_share: 0.0,
        };

        let created = m.suggest(&snapshot(&[("a", "x", Some(0.1))]), &[verdict]).unwrap();
        assert_eq!(created.len(), 1);
    }
}
