//! Pre/post cohort analysis for implemented suggestions.

use agentrace_suggest::{Suggestion, SuggestionStatus};
use agentrace_utils::types::{CohortVerdict, HistoryRow, Verdict};
use chrono::{DateTime, Utc};

/// Rated history for one signal, split at the implementation time.
#[derive(Debug, Clone, PartialEq)]
pub struct Cohorts {
    pub pre: Vec<f64>,
    pub post: Vec<f64>,
}

impl Cohorts {
    /// Rows strictly after `implemented_at` are post-implementation. Rows
    /// without a rate are not data points.
    #[must_use]
    pub fn split(rows: &[HistoryRow], signal_id: &str, implemented_at: DateTime<Utc>) -> Self {
        let mut cohorts = Self {
            pre: Vec::new(),
            post: Vec::new(),
        };
        for row in rows.iter().filter(|r| r.signal_id() == signal_id) {
            let Some(rate) = row.rate else { continue };
            if row.ts > implemented_at {
                cohorts.post.push(rate);
            } else {
                cohorts.pre.push(rate);
            }
        }
        cohorts
    }

    #[must_use]
    pub fn improved_count(&self, baseline: f64) -> usize {
        self.post.iter().filter(|&&rate| rate > baseline).count()
    }
}

/// A suggestion that can take part in cohort analysis, with the anchors it
/// needs. `None` for anything but an implemented suggestion with a timestamp
/// and a signal; legacy entries without `implemented_at` never qualify.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub suggestion: &'a Suggestion,
    pub signal_id: &'a str,
    pub implemented_at: DateTime<Utc>,
    pub baseline: f64,
}

impl<'a> Candidate<'a> {
    #[must_use]
    pub fn from_suggestion(suggestion: &'a Suggestion) -> Option<Self> {
        if suggestion.status != SuggestionStatus::Implemented {
            return None;
        }
        Some(Self {
            suggestion,
            signal_id: suggestion.signal_id.as_deref()?,
            implemented_at: suggestion.implemented_at?,
            baseline: suggestion.metric_value_at_suggestion?,
        })
    }

    #[must_use]
    pub fn verdict(&self, cohorts: &Cohorts, verdict: Verdict) -> CohortVerdict {
        let improved_count = cohorts.improved_count(self.baseline);
        CohortVerdict {
            suggestion_id: self.suggestion.id.clone(),
            signal_id: Some(self.signal_id.to_string()),
            metric: self.suggestion.metric.clone(),
            verdict,
            baseline: self.baseline,
            pre_count: cohorts.pre.len(),
            post_count: cohorts.post.len(),
            improved_count,
            improved_share: share(improved_count, cohorts.post.len()),
        }
    }
}

fn share(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// `Some(ineffective)` when the post cohort is large enough and fewer than
/// `improved_share` of its points beat the baseline. Too few points is no
/// verdict at all.
#[must_use]
pub fn judge_regression(
    candidate: &Candidate<'_>,
    cohorts: &Cohorts,
    min_points: usize,
    improved_share: f64,
) -> Option<CohortVerdict> {
    if cohorts.post.len() < min_points {
        return None;
    }
    let verdict = candidate.verdict(cohorts, Verdict::Ineffective);
    (verdict.improved_share < improved_share).then_some(verdict)
}

/// `Some(converged)` when the post cohort is large enough and its last
/// `window` points all satisfy `rate >= threshold`.
#[must_use]
pub fn judge_convergence(
    candidate: &Candidate<'_>,
    cohorts: &Cohorts,
    min_points: usize,
    window: usize,
    threshold: f64,
) -> Option<CohortVerdict> {
    if cohorts.post.len() < min_points.max(window) {
        return None;
    }
    let tail = &cohorts.post[cohorts.post.len() - window..];
    tail.iter()
        .all(|&rate| rate >= threshold)
        .then(|| candidate.verdict(cohorts, Verdict::Converged))
}
