//! Logging setup for agentrace.
//!
//! Library crates only emit `tracing` events with structured fields
//! (`trace_id`, `agent_type`, `signal_id`, ...). The binary installs the
//! subscriber once at startup via [`init_tracing`]; `RUST_LOG` overrides the
//! default filter.

use std::io::IsTerminal;
use tracing::{Level, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single lines on stderr.
    #[default]
    Compact,
    /// One JSON object per event, for log shippers.
    Json,
}

fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr so stdout stays reserved for command output (trace ids,
/// JSON reports). Verbose mode lowers the agentrace crates to `debug` and
/// reports span durations.
pub fn init_tracing(verbose: bool, format: LogFormat) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("agentrace=debug,info")
            } else {
                EnvFilter::try_new("agentrace=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let span_events = if verbose { FmtSpan::CLOSE } else { FmtSpan::NONE };

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_span_events(span_events),
                )
                .try_init()?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(use_color())
                        .with_target(verbose)
                        .with_thread_ids(false)
                        .with_line_number(false)
                        .with_file(false)
                        .with_span_events(span_events)
                        .compact(),
                )
                .try_init()?;
        }
    }

    Ok(())
}

/// Span wrapping one pipeline step (`init`, `finalize`, `analyze`, ...).
pub fn operation_span(operation: &str) -> tracing::Span {
    span!(Level::INFO, "agentrace_op", op = %operation)
}

/// Span wrapping work on a single trace.
pub fn trace_span(trace_id: &str, agent_type: &str) -> tracing::Span {
    span!(
        Level::DEBUG,
        "trace",
        trace_id = %trace_id,
        agent_type = %agent_type,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_can_be_entered_without_subscriber() {
        let span = operation_span("analyze");
        let _guard = span.enter();
        let inner = trace_span("implementer-20260101-000000-abc123", "implementer");
        let _inner_guard = inner.enter();
    }

    #[test]
    fn test_default_format_is_compact() {
        assert_eq!(LogFormat::default(), LogFormat::Compact);
    }
}
