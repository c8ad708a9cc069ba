use std::fmt;
use std::io;
use thiserror::Error;

/// Library-level error type for every agentrace operation.
///
/// The variants follow the failure taxonomy the pipeline promises its callers:
///
/// | Variant | Meaning |
/// |---------|---------|
/// | `Corrupt` | A file exists but does not parse. Nothing downstream was modified. |
/// | `WriteRejected` | A serialized document failed validation; the previous file is intact. |
/// | `MissingFile` | A consumer-required file (e.g. `metrics.json`) does not exist yet. |
/// | `Io` | Filesystem failure, with the path that failed. |
/// | `Config` / `Trace` / `State` | Domain errors from the respective component. |
///
/// Files that are legitimately optional (compliance records, history, prior
/// state) never produce an error; callers receive a default instead.
///
/// # Example
///
/// ```rust
/// use agentrace_utils::error::AgentraceError;
/// use agentrace_utils::exit_codes::ExitCode;
///
/// let err = AgentraceError::corrupt("traces/t1/manifest.json", "expected value at line 1");
/// assert_eq!(err.to_exit_code(), ExitCode::DATA_CORRUPTION);
/// assert!(err.display_for_user().contains("Suggestions:"));
/// ```
#[derive(Error, Debug)]
pub enum AgentraceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("Suggestion state error: {0}")]
    State(#[from] StateError),

    #[error("Corrupted data in {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Refusing to replace {path}: {reason}")]
    WriteRejected { path: String, reason: String },

    #[error("Required file not found: {path}")]
    MissingFile { path: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T, E = AgentraceError> = std::result::Result<T, E>;

impl AgentraceError {
    pub fn io(path: impl fmt::Display, source: io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    pub fn corrupt(path: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::Corrupt {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn write_rejected(path: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::WriteRejected {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True when the error means a document on disk could not be parsed.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    DataCorruption,
    FileSystem,
    TraceLifecycle,
    StateMachine,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::DataCorruption => write!(f, "Data Corruption"),
            Self::FileSystem => write!(f, "File System"),
            Self::TraceLifecycle => write!(f, "Trace Lifecycle"),
            Self::StateMachine => write!(f, "Suggestion State"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file {path}: {reason}")]
    InvalidFile { path: String, reason: String },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Cannot determine a default for {key}: {reason}")]
    NoDefault { key: String, reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile { path, reason } => {
                format!("Configuration file {path} has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::NoDefault { key, reason } => {
                format!("No value for '{key}' and no default available: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile { .. } => Some(
                "Configuration files are TOML with optional [paths], [thresholds] and [compliance] sections."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' option is range-checked when the configuration is built."
            )),
            Self::NotFound { .. } => Some(
                "agentrace searches for .agentrace/config.toml from the current directory upward."
                    .to_string(),
            ),
            Self::NoDefault { .. } => {
                Some("Default paths are derived from the home directory.".to_string())
            }
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile { .. } => vec![
                "Check the TOML syntax of the configuration file".to_string(),
                "Remove unknown keys; the schema is strict".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "compliance_threshold" | "improved_share" => {
                    vec!["Use a fraction between 0.0 and 1.0".to_string()]
                }
                "trend_window" => vec!["Use a window of at least 2 rows".to_string()],
                _ => vec!["Remove the option to use the built-in default".to_string()],
            },
            Self::NotFound { .. } => vec![
                "Create .agentrace/config.toml in your project root".to_string(),
                "Pass --config <path> with an existing file".to_string(),
            ],
            Self::NoDefault { key, .. } => vec![format!(
                "Set '{key}' explicitly with a CLI flag or AGENTRACE_* environment variable"
            )],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Trace lifecycle errors
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Trace '{trace_id}' not found in the store")]
    NotFound { trace_id: String },

    #[error("Invalid trace id '{trace_id}': {reason}")]
    InvalidTraceId { trace_id: String, reason: String },

    #[error("Could not allocate a unique trace id: {reason}")]
    AllocationFailed { reason: String },

    #[error("Trace '{trace_id}' belongs to agent '{actual}', not '{expected}'")]
    AgentMismatch {
        trace_id: String,
        expected: String,
        actual: String,
    },
}

impl UserFriendlyError for TraceError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::NotFound { .. } => Some(
                "Traces live as directories directly under the store root; archived traces are not searched."
                    .to_string(),
            ),
            Self::InvalidTraceId { .. } => {
                Some("Trace ids are single path components without separators.".to_string())
            }
            Self::AllocationFailed { .. } | Self::AgentMismatch { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::NotFound { .. } => vec![
                "Run `agentrace rebuild-index` and look the id up in index.jsonl".to_string(),
                "Check that --store-root points at the same store the agent wrote to".to_string(),
            ],
            Self::InvalidTraceId { .. } => {
                vec!["Pass the id printed by `agentrace init`".to_string()]
            }
            Self::AllocationFailed { .. } => {
                vec!["Check that the store root is writable".to_string()]
            }
            Self::AgentMismatch { .. } => {
                vec!["Pass the agent type the trace was created with".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::TraceLifecycle
    }
}

/// Suggestion state machine errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Suggestion '{id}' does not exist")]
    UnknownSuggestion { id: String },

    #[error("Suggestion '{id}' cannot move from {from} to {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("State document version {version} is newer than this build supports")]
    UnsupportedVersion { version: u32 },
}

impl UserFriendlyError for StateError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidTransition { .. } => Some(
                "Allowed: proposed -> implemented|rejected|deferred, deferred -> proposed, implemented -> converged|ineffective."
                    .to_string(),
            ),
            Self::UnsupportedVersion { .. } => {
                Some("State documents are only ever migrated forward.".to_string())
            }
            Self::UnknownSuggestion { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::UnknownSuggestion { .. } => {
                vec!["List suggestions with `agentrace suggestions`".to_string()]
            }
            Self::InvalidTransition { .. } => vec![
                "Re-proposal after an ineffective fix happens automatically on the next analysis"
                    .to_string(),
            ],
            Self::UnsupportedVersion { .. } => {
                vec!["Upgrade agentrace to read this state document".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::StateMachine
    }
}

impl UserFriendlyError for AgentraceError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Trace(e) => e.user_message(),
            Self::State(e) => e.user_message(),
            Self::Corrupt { path, reason } => {
                format!("{path} exists but could not be parsed: {reason}")
            }
            Self::WriteRejected { path, reason } => {
                format!("Refused to replace {path}; the serialized document was invalid: {reason}")
            }
            Self::MissingFile { path } => format!("{path} does not exist yet"),
            Self::Io { path, source } => format!("Filesystem operation on {path} failed: {source}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Trace(e) => e.context(),
            Self::State(e) => e.context(),
            Self::Corrupt { .. } => Some(
                "Corrupted documents are never repaired automatically; the operation stopped before writing anything."
                    .to_string(),
            ),
            Self::WriteRejected { .. } => Some("The previous version of the file is unchanged.".to_string()),
            Self::MissingFile { path } if path.ends_with("metrics.json") => {
                Some("metrics.json is produced by `agentrace analyze`.".to_string())
            }
            Self::MissingFile { .. } | Self::Io { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Trace(e) => e.suggestions(),
            Self::State(e) => e.suggestions(),
            Self::Corrupt { path, .. } => vec![
                format!("Inspect {path} and fix or move it aside by hand"),
                "Re-run the command once the file parses".to_string(),
            ],
            Self::WriteRejected { .. } => {
                vec!["Report this as a bug; the in-memory document did not serialize".to_string()]
            }
            Self::MissingFile { path } if path.ends_with("metrics.json") => {
                vec!["Run `agentrace analyze` first".to_string()]
            }
            Self::MissingFile { .. } => vec!["Check the configured paths".to_string()],
            Self::Io { .. } => vec![
                "Check permissions on the store and observatory directories".to_string(),
                "Check available disk space".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Trace(e) => e.category(),
            Self::State(e) => e.category(),
            Self::Corrupt { .. } => ErrorCategory::DataCorruption,
            Self::WriteRejected { .. } | Self::MissingFile { .. } | Self::Io { .. } => {
                ErrorCategory::FileSystem
            }
        }
    }
}

impl AgentraceError {
    /// Get a user-friendly error message with context and actionable suggestions.
    ///
    /// ```text
    /// Error: <user message>
    ///
    /// Context: <context if available>
    ///
    /// Suggestions:
    ///   • <suggestion 1>
    /// ```
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        output
    }

    /// Map this error to the CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> crate::exit_codes::ExitCode {
        use crate::exit_codes::ExitCode;

        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Corrupt { .. } | Self::WriteRejected { .. } => ExitCode::DATA_CORRUPTION,
            Self::MissingFile { .. } => ExitCode::NOT_FOUND,
            Self::Trace(TraceError::NotFound { .. }) => ExitCode::NOT_FOUND,
            Self::Trace(TraceError::InvalidTraceId { .. } | TraceError::AgentMismatch { .. }) => {
                ExitCode::CLI_ARGS
            }
            Self::State(StateError::UnknownSuggestion { .. }) => ExitCode::NOT_FOUND,
            Self::State(StateError::InvalidTransition { .. }) => ExitCode::INVALID_TRANSITION,
            Self::State(StateError::UnsupportedVersion { .. }) => ExitCode::DATA_CORRUPTION,
            _ => ExitCode::INTERNAL,
        }
    }
}
