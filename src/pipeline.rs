//! One full observatory pass: analyze, converge, suggest.

use agentrace_config::Config;
use agentrace_convergence::{ConvergenceEngine, ConvergenceReport};
use agentrace_metrics::MetricsAnalyzer;
use agentrace_suggest::{Suggestion, SuggestionMachine};
use agentrace_trace::TraceStore;
use agentrace_utils::error::Result;
use agentrace_utils::logging::operation_span;
use agentrace_utils::types::{MetricsSnapshot, timestamp_now};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a pipeline pass produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub snapshot: MetricsSnapshot,
    pub history_rows: usize,
    pub convergence: ConvergenceReport,
    /// Every suggestion proposed during this pass, from analysis and from
    /// the post-convergence step.
    pub proposed: Vec<Suggestion>,
}

/// The four components wired against one configuration.
#[derive(Debug)]
pub struct Pipeline {
    store: TraceStore,
    analyzer: MetricsAnalyzer,
    engine: ConvergenceEngine,
    machine: SuggestionMachine,
}

impl Pipeline {
    /// Pipeline over the filesystem store and `git`.
    #[must_use]
    pub fn open(config: &Config) -> Self {
        Self::with_store(config, TraceStore::open(config))
    }

    #[must_use]
    pub fn with_store(config: &Config, store: TraceStore) -> Self {
        Self {
            store,
            analyzer: MetricsAnalyzer::new(config),
            engine: ConvergenceEngine::from_config(config),
            machine: SuggestionMachine::from_config(config),
        }
    }

    #[must_use]
    pub fn store(&self) -> &TraceStore {
        &self.store
    }

    #[must_use]
    pub fn analyzer(&self) -> &MetricsAnalyzer {
        &self.analyzer
    }

    #[must_use]
    pub fn engine(&self) -> &ConvergenceEngine {
        &self.engine
    }

    #[must_use]
    pub fn machine(&self) -> &SuggestionMachine {
        &self.machine
    }

    pub fn run(&self) -> Result<PipelineReport> {
        self.run_at(timestamp_now())
    }

    /// Analyze the store, judge implemented suggestions against history, then
    /// re-propose for signals that regressed.
    pub fn run_at(&self, now: DateTime<Utc>) -> Result<PipelineReport> {
        let span = operation_span("pipeline");
        let _guard = span.enter();

        let analysis = self.analyzer.analyze_at(&self.store, &self.machine, now)?;
        let convergence = self.engine.converge_at(now)?;

        let mut proposed = analysis.proposed;
        if !convergence.regressions.is_empty() {
            proposed.extend(
                self.machine
                    .suggest_at(&analysis.snapshot, &convergence.regressions, now)?,
            );
        }

        Ok(PipelineReport {
            snapshot: analysis.snapshot,
            history_rows: analysis.history_rows,
            convergence,
            proposed,
        })
    }
}
