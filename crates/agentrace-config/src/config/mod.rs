//! Hierarchical configuration with discovery and precedence:
//! CLI > environment > config file > defaults.
//!
//! The config file is TOML at `.agentrace/config.toml` with optional
//! `[paths]`, `[thresholds]` and `[compliance]` sections:
//!
//! ```toml
//! [paths]
//! store_root = "traces"          # relative to the directory holding .agentrace/
//! obs_dir = "observatory"
//!
//! [thresholds]
//! compliance_threshold = 0.7
//! trend_window = 5
//!
//! [compliance]
//! artifacts = ["summary.md", "test-output.txt"]
//!
//! [compliance.agents]
//! reviewer = ["summary.md"]
//! ```

mod builder;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use model::*;

use camino::Utf8PathBuf;

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Command-line flag (highest precedence).
    Cli,
    /// `AGENTRACE_*` environment variable.
    Env,
    /// `.agentrace/config.toml`.
    Config,
    /// `Config::builder()`.
    Programmatic,
    /// Built-in default.
    Default,
}

/// Path overrides taken from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<Utf8PathBuf>,
    pub store_root: Option<Utf8PathBuf>,
    pub obs_dir: Option<Utf8PathBuf>,
    pub state_file: Option<Utf8PathBuf>,
    pub marker_dir: Option<Utf8PathBuf>,
    pub session_id: Option<String>,
}

/// Environment variable names read during discovery.
pub mod env_vars {
    pub const STORE_ROOT: &str = "AGENTRACE_STORE";
    pub const OBS_DIR: &str = "AGENTRACE_OBS_DIR";
    pub const STATE_FILE: &str = "AGENTRACE_STATE_FILE";
    pub const MARKER_DIR: &str = "AGENTRACE_MARKER_DIR";
    pub const SESSION_ID: &str = "AGENTRACE_SESSION_ID";
}

/// Snapshot of the `AGENTRACE_*` variables, captured once.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub store_root: Option<Utf8PathBuf>,
    pub obs_dir: Option<Utf8PathBuf>,
    pub state_file: Option<Utf8PathBuf>,
    pub marker_dir: Option<Utf8PathBuf>,
    pub session_id: Option<String>,
}

impl EnvOverrides {
    /// Read the overrides from the process environment. Empty values count as unset.
    #[must_use]
    pub fn from_process_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build overrides from an arbitrary lookup, for tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            store_root: get(env_vars::STORE_ROOT).map(Utf8PathBuf::from),
            obs_dir: get(env_vars::OBS_DIR).map(Utf8PathBuf::from),
            state_file: get(env_vars::STATE_FILE).map(Utf8PathBuf::from),
            marker_dir: get(env_vars::MARKER_DIR).map(Utf8PathBuf::from),
            session_id: get(env_vars::SESSION_ID),
        }
    }
}
