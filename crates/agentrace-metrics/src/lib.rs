//! Point-in-time compliance and outcome metrics.
//!
//! [`MetricsAnalyzer`] reads every live manifest and compliance record,
//! writes `metrics.json` (canonical JSON, full overwrite) and appends one row
//! per `(agent_type, artifact)` to `metrics-history.jsonl`.

pub mod analyzer;
pub mod compliance;
pub mod history;
pub mod snapshot;

pub use analyzer::{AnalysisReport, MetricsAnalyzer};
pub use compliance::{Observation, observe};
pub use history::HistoryLog;
pub use snapshot::{load_snapshot, write_snapshot};
