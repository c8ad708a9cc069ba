//! agentrace - trace store and compliance observatory for autonomous agents
//!
//! One trace is recorded per agent invocation. Traces are aggregated into
//! compliance and outcome metrics, the metrics history is checked for
//! improvement, and a versioned suggestion document tracks process fixes
//! from proposal to convergence.
//!
//! ```text
//! agents ──> TraceStore.init / finalize
//!                 │
//!                 ▼
//!          MetricsAnalyzer.analyze ──> metrics.json, metrics-history.jsonl
//!                 │
//!                 ▼
//!        ConvergenceEngine.converge ──> ineffective / converged verdicts
//!                 │
//!                 ▼
//!       SuggestionMachine.suggest ──> state.json
//! ```
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! agentrace init --agent implementer
//! agentrace finalize "$(agentrace detect --agent implementer)" --agent implementer
//! agentrace run
//! agentrace report
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use agentrace::{Config, Pipeline};
//!
//! let config = Config::builder()
//!     .store_root("/srv/agentrace/traces")
//!     .obs_dir("/srv/agentrace/observatory")
//!     .build()?;
//! let report = Pipeline::open(&config).run()?;
//! println!("{} trace(s) analyzed", report.snapshot.trace_count);
//! # Ok::<(), agentrace::AgentraceError>(())
//! ```
//!
//! # JSON Output
//!
//! `metrics.json` and every `--json` CLI output are emitted as JCS
//! (RFC 8785) canonical JSON. Manifests and the suggestion document are
//! pretty-printed.

pub mod cli;
pub mod pipeline;

pub use pipeline::{Pipeline, PipelineReport};

pub use agentrace_config::{CliArgs, Config, ConfigBuilder, ConfigSource};
pub use agentrace_convergence::{ConvergenceEngine, ConvergenceReport, Trend, TrendReport};
pub use agentrace_metrics::{AnalysisReport, HistoryLog, MetricsAnalyzer, load_snapshot};
pub use agentrace_suggest::{StateDocument, StateStore, Suggestion, SuggestionMachine, SuggestionStatus};
pub use agentrace_trace::{FinalizeResult, MarkerStore, TraceStore, Vcs};
pub use agentrace_utils::canonicalization::emit_jcs;
pub use agentrace_utils::error::{AgentraceError, Result};
pub use agentrace_utils::exit_codes::ExitCode;
pub use agentrace_utils::types::{
    CohortVerdict, ComplianceRecord, HistoryRow, Manifest, MetricsSnapshot, Outcome, TestResult,
    TraceStatus, Verdict,
};
