//! CLI argument definitions (clap derive).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// agentrace - trace store and compliance observatory for autonomous agents
#[derive(Parser, Debug)]
#[command(name = "agentrace")]
#[command(about = "Record agent traces, aggregate compliance metrics and track process fixes")]
#[command(long_about = r#"
agentrace records one trace per agent invocation, aggregates traces into
compliance and outcome metrics, tracks whether those metrics improve, and
maintains a suggestion document of proposed process fixes.

EXAMPLES:
  # Start a trace for an implementer agent in the current project
  agentrace init --agent implementer

  # Find the trace this session is producing, then finalize it
  agentrace finalize "$(agentrace detect --agent implementer)" --agent implementer

  # Run analysis, convergence and suggestion in one pass
  agentrace run --json

  # Mark a suggestion as implemented
  agentrace transition SUG-003 implemented

CONFIGURATION:
  Precedence: CLI flags > AGENTRACE_* environment > .agentrace/config.toml > defaults
  The config file is discovered by searching upward from the current directory.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Trace store root
    #[arg(long, global = true)]
    pub store_root: Option<PathBuf>,

    /// Observatory directory (metrics.json, metrics-history.jsonl)
    #[arg(long, global = true)]
    pub obs_dir: Option<PathBuf>,

    /// Suggestion state document
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    /// Directory holding active-trace markers
    #[arg(long, global = true)]
    pub marker_dir: Option<PathBuf>,

    /// Session identifier used to key markers
    #[arg(long, global = true)]
    pub session_id: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new trace and print its id
    Init {
        /// Agent type (letters, digits, '-' and '_')
        #[arg(long)]
        agent: String,
        /// Project directory (default: current directory)
        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// Print the id of the active trace for this session and project
    Detect {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// Finalize a trace (idempotent)
    Finalize {
        trace_id: String,
        #[arg(long)]
        agent: String,
        #[arg(long)]
        project: Option<PathBuf>,
        /// Output the finalized manifest as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-run resolution on finalized traces for late-arriving artifacts
    Refinalize {
        /// Trace to re-finalize
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        trace_id: Option<String>,
        /// Re-finalize every finalized trace in the store
        #[arg(long)]
        all: bool,
    },

    /// Rewrite index.jsonl from the manifests on disk
    RebuildIndex,

    /// Close active traces older than the staleness window
    Heal,

    /// Move finalized traces into the archive subtree
    Archive {
        /// Archive traces started before this RFC 3339 timestamp
        #[arg(long, conflicts_with = "older_than_days")]
        before: Option<String>,
        /// Archive traces started more than this many days ago
        #[arg(long, default_value_t = 30)]
        older_than_days: u32,
    },

    /// Write metrics.json and append to the metrics history
    Analyze {
        #[arg(long)]
        json: bool,
    },

    /// Classify the recent trend of one compliance signal
    Trend {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        artifact: String,
        /// Number of history points to consider (default: configured window)
        #[arg(long)]
        window: Option<usize>,
        #[arg(long)]
        json: bool,
    },

    /// Judge implemented suggestions against post-implementation history
    Converge {
        #[arg(long)]
        json: bool,
    },

    /// Propose suggestions from the current metrics.json
    Suggest {
        #[arg(long)]
        json: bool,
    },

    /// Analyze, converge and suggest in one pass
    Run {
        #[arg(long)]
        json: bool,
    },

    /// List suggestions
    Suggestions {
        /// Only suggestions in this status
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Move a suggestion to a new status
    Transition {
        id: String,
        /// proposed, implemented, converged, ineffective, rejected or deferred
        status: String,
    },

    /// Summarize the current metrics.json (fails if no analysis has run)
    Report {
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration and where each value came from
    Config {
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Operation name used in logs and error reports.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Detect { .. } => "detect",
            Self::Finalize { .. } => "finalize",
            Self::Refinalize { .. } => "refinalize",
            Self::RebuildIndex => "rebuild-index",
            Self::Heal => "heal",
            Self::Archive { .. } => "archive",
            Self::Analyze { .. } => "analyze",
            Self::Trend { .. } => "trend",
            Self::Converge { .. } => "converge",
            Self::Suggest { .. } => "suggest",
            Self::Run { .. } => "run",
            Self::Suggestions { .. } => "suggestions",
            Self::Transition { .. } => "transition",
            Self::Report { .. } => "report",
            Self::Config { .. } => "config",
        }
    }
}
