use agentrace_config::{Config, Thresholds};
use agentrace_metrics::HistoryLog;
use agentrace_metrics::history::select;
use agentrace_suggest::machine::apply_transition;
use agentrace_suggest::{StateStore, SuggestionStatus};
use agentrace_utils::error::Result;
use agentrace_utils::logging::operation_span;
use agentrace_utils::types::{CohortVerdict, timestamp_now};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::regression::{Candidate, Cohorts, judge_convergence, judge_regression};
use crate::trend::{TrendReport, report};

/// Everything one `converge` pass decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub generated_at: DateTime<Utc>,
    pub trends: Vec<TrendReport>,
    /// Suggestions moved to `ineffective` by this pass.
    pub regressions: Vec<CohortVerdict>,
    /// Suggestions moved to `converged` by this pass.
    pub converged: Vec<CohortVerdict>,
}

#[derive(Debug, Clone)]
pub struct ConvergenceEngine {
    history: HistoryLog,
    state: StateStore,
    thresholds: Thresholds,
}

impl ConvergenceEngine {
    pub fn new(history: HistoryLog, state: StateStore, thresholds: Thresholds) -> Self {
        Self {
            history,
            state,
            thresholds,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            HistoryLog::new(config.paths.history_file()),
            StateStore::new(config.paths.state_file.clone()),
            config.thresholds,
        )
    }

    /// Trend for one signal. `window` defaults to the configured trend window.
    pub fn trend(&self, agent_type: &str, artifact: &str, window: Option<usize>) -> Result<TrendReport> {
        let rows = self.history.series(agent_type, artifact)?;
        Ok(report(
            agent_type,
            artifact,
            &rows,
            window.unwrap_or(self.thresholds.trend_window),
            self.thresholds.slope_band,
        ))
    }

    /// Trend for every signal in the history log.
    pub fn trends(&self) -> Result<Vec<TrendReport>> {
        let rows = self.history.read_all()?;
        let mut keys: Vec<(String, String)> = rows
            .iter()
            .map(|r| (r.agent_type.clone(), r.artifact.clone()))
            .collect();
        keys.sort();
        keys.dedup();

        Ok(keys
            .into_iter()
            .map(|(agent_type, artifact)| {
                let series = select(rows.clone(), &agent_type, &artifact);
                report(
                    &agent_type,
                    &artifact,
                    &series,
                    self.thresholds.trend_window,
                    self.thresholds.slope_band,
                )
            })
            .collect())
    }

    pub fn detect_regressions(&self) -> Result<Vec<CohortVerdict>> {
        self.detect_regressions_at(timestamp_now())
    }

    /// Mark implemented suggestions whose post-implementation cohort shows
    /// no material improvement as `ineffective`. The state document is
    /// rewritten in the same call when anything changed.
    pub fn detect_regressions_at(&self, now: DateTime<Utc>) -> Result<Vec<CohortVerdict>> {
        let t = self.thresholds;
        self.judge_and_apply(now, SuggestionStatus::Ineffective, |cand, cohorts| {
            judge_regression(cand, cohorts, t.cohort_min_points, t.improved_share)
        })
    }

    pub fn check_convergence(&self) -> Result<Vec<CohortVerdict>> {
        self.check_convergence_at(timestamp_now())
    }

    /// Mark implemented suggestions whose recent post-implementation points
    /// all meet the compliance threshold as `converged`.
    pub fn check_convergence_at(&self, now: DateTime<Utc>) -> Result<Vec<CohortVerdict>> {
        let t = self.thresholds;
        self.judge_and_apply(now, SuggestionStatus::Converged, |cand, cohorts| {
            judge_convergence(
                cand,
                cohorts,
                t.cohort_min_points,
                t.trend_window,
                t.compliance_threshold,
            )
        })
    }

    fn judge_and_apply<F>(&self, now: DateTime<Utc>, to: SuggestionStatus, judge: F) -> Result<Vec<CohortVerdict>>
    where
        F: Fn(&Candidate<'_>, &Cohorts) -> Option<CohortVerdict>,
    {
        let mut doc = self.state.load()?;
        let rows = self.history.read_all()?;

        let mut skipped_legacy = 0usize;
        let verdicts: Vec<CohortVerdict> = doc
            .with_status(SuggestionStatus::Implemented)
            .filter_map(|s| {
                let Some(cand) = Candidate::from_suggestion(s) else {
                    skipped_legacy += 1;
                    return None;
                };
                let cohorts = Cohorts::split(&rows, cand.signal_id, cand.implemented_at);
                judge(&cand, &cohorts)
            })
            .collect();

        if skipped_legacy > 0 {
            tracing::debug!(count = skipped_legacy, "implemented suggestions without cohort anchors skipped");
        }
        if verdicts.is_empty() {
            return Ok(verdicts);
        }

        for verdict in &verdicts {
            apply_transition(&mut doc, &verdict.suggestion_id, to, now)?;
            tracing::info!(
                suggestion_id = %verdict.suggestion_id,
                signal_id = ?verdict.signal_id,
                status = %to,
                post_count = verdict.post_count,
                improved_share = verdict.improved_share,
                "cohort verdict applied"
            );
        }
        self.state.save(&mut doc)?;
        Ok(verdicts)
    }

    pub fn converge(&self) -> Result<ConvergenceReport> {
        self.converge_at(timestamp_now())
    }

    /// Regressions first, then convergence, then trends for every signal.
    pub fn converge_at(&self, now: DateTime<Utc>) -> Result<ConvergenceReport> {
        let span = operation_span("converge");
        let _guard = span.enter();

        let regressions = self.detect_regressions_at(now)?;
        let converged = self.check_convergence_at(now)?;
        let trends = self.trends()?;

        tracing::info!(
            signals = trends.len(),
            regressions = regressions.len(),
            converged = converged.len(),
            "convergence pass complete"
        );
        Ok(ConvergenceReport {
            generated_at: now,
            trends,
            regressions,
            converged,
        })
    }
}
