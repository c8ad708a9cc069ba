use agentrace_utils::types::metric_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 3;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SuggestionStatus {
    Proposed,
    Implemented,
    Converged,
    Ineffective,
    Rejected,
    Deferred,
}

impl SuggestionStatus {
    /// The allowed-transition table.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        use SuggestionStatus::*;
        matches!(
            (self, to),
            (Proposed, Implemented | Rejected | Deferred)
                | (Deferred, Proposed)
                | (Implemented, Converged | Ineffective)
        )
    }

    /// Whether a suggestion in this status prevents a new proposal for the
    /// same signal. Rejections stand; ineffective and converged do not block.
    #[must_use]
    pub const fn blocks_reproposal(self) -> bool {
        matches!(
            self,
            Self::Proposed | Self::Implemented | Self::Deferred | Self::Rejected
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    /// Dotted metric path, e.g. `implementer.test-output.txt.rate`.
    pub metric: String,
    #[serde(default)]
    pub metric_value_at_suggestion: Option<f64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub convergence_check: String,
    pub status: SuggestionStatus,
    #[serde(default)]
    pub suggested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub implemented_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub converged_at: Option<DateTime<Utc>>,
    /// `{agent_type}.{artifact}`; absent only on documents older than v3.
    #[serde(default)]
    pub signal_id: Option<String>,
}

/// Ledger entry appended when a suggestion enters `implemented`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementedRecord {
    pub sug_id: String,
    pub signal_id: Option<String>,
    pub implemented_at: Option<DateTime<Utc>>,
}

/// The persisted suggestion state (`state.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub version: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub implemented: Vec<ImplementedRecord>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            updated_at: None,
            suggestions: Vec::new(),
            implemented: Vec::new(),
        }
    }
}

impl StateDocument {
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Suggestion> {
        self.suggestions.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Suggestion> {
        self.suggestions.iter_mut().find(|s| s.id == id)
    }

    /// Whether any suggestion for `signal_id` blocks a new proposal.
    ///
    /// Suggestions without a `signal_id` (pre-v3) are matched on their metric
    /// path instead; the stored document is not changed.
    #[must_use]
    pub fn is_blocked(&self, signal_id: &str) -> bool {
        let metric = metric_path(signal_id);
        self.suggestions.iter().any(|s| {
            let same_signal = match s.signal_id.as_deref() {
                Some(id) => id == signal_id,
                None => s.metric == metric,
            };
            same_signal && s.status.blocks_reproposal()
        })
    }

    /// Next `SUG-NNN` id: one past the highest numeric suffix in use.
    #[must_use]
    pub fn next_id(&self) -> String {
        let max = self
            .suggestions
            .iter()
            .filter_map(|s| s.id.strip_prefix("SUG-")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("SUG-{:03}", max + 1)
    }

    pub fn with_status(&self, status: SuggestionStatus) -> impl Iterator<Item = &Suggestion> {
        self.suggestions.iter().filter(move |s| s.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SuggestionStatus::*;

    const ALL: [SuggestionStatus; 6] = [Proposed, Implemented, Converged, Ineffective, Rejected, Deferred];

    #[test]
    fn test_transition_table() {
        let allowed: Vec<(SuggestionStatus, SuggestionStatus)> = ALL
            .iter()
            .flat_map(|&from| ALL.iter().map(move |&to| (from, to)))
            .filter(|&(from, to)| from.can_transition_to(to))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (Proposed, Implemented),
                (Proposed, Rejected),
                (Proposed, Deferred),
                (Implemented, Converged),
                (Implemented, Ineffective),
                (Deferred, Proposed),
            ]
        );
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [Converged, Ineffective, Rejected] {
            assert!(ALL.iter().all(|&to| !terminal.can_transition_to(to)));
        }
    }

    #[test]
    fn test_next_id_skips_foreign_ids() {
        let mut doc = StateDocument::default();
        assert_eq!(doc.next_id(), "SUG-001");

        for id in ["SUG-002", "SUG-010", "manual-7"] {
            doc.suggestions.push(Suggestion {
                id: id.to_string(),
                metric: "a.b.rate".into(),
                metric_value_at_suggestion: None,
                title: String::new(),
                convergence_check: String::new(),
                status: Proposed,
                suggested_at: None,
                implemented_at: None,
                converged_at: None,
                signal_id: None,
            });
        }
        assert_eq!(doc.next_id(), "SUG-011");
    }

    #[test]
    fn test_suggestion_without_signal_blocks_by_metric() {
        let mut doc = StateDocument::default();
        doc.suggestions.push(Suggestion {
            id: "SUG-001".into(),
            metric: "tester.summary.md.rate".into(),
            metric_value_at_suggestion: Some(0.2),
            title: String::new(),
            convergence_check: String::new(),
            status: Proposed,
            suggested_at: None,
            implemented_at: None,
            converged_at: None,
            signal_id: None,
        });

        assert!(doc.is_blocked("tester.summary.md"));
        assert!(!doc.is_blocked("tester.review.md"));

        doc.suggestions[0].status = Ineffective;
        assert!(!doc.is_blocked("tester.summary.md"));
    }
}
