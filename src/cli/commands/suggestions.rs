use agentrace_config::Config;
use agentrace_suggest::{SuggestionMachine, SuggestionStatus};
use agentrace_utils::error::{AgentraceError, ConfigError};
use anyhow::Result;
use std::str::FromStr;

use super::common::{format_rate, print_json};

fn parse_status(text: &str) -> Result<SuggestionStatus> {
    SuggestionStatus::from_str(text).map_err(|_| {
        AgentraceError::from(ConfigError::InvalidValue {
            key: "status".to_string(),
            value: format!(
                "{text} (expected proposed, implemented, converged, ineffective, rejected or deferred)"
            ),
        })
        .into()
    })
}

pub fn execute_suggestions_command(config: &Config, status: Option<&str>, json: bool) -> Result<()> {
    let filter = status.map(parse_status).transpose()?;
    let suggestions: Vec<_> = SuggestionMachine::from_config(config)
        .list()?
        .into_iter()
        .filter(|s| filter.is_none_or(|f| s.status == f))
        .collect();

    if json {
        return print_json(&suggestions);
    }
    if suggestions.is_empty() {
        println!("no suggestions");
    }
    for s in &suggestions {
        println!(
            "{:<8} {:<12} {:>7}  {}",
            s.id,
            s.status,
            format_rate(s.metric_value_at_suggestion),
            s.title
        );
    }
    Ok(())
}

pub fn execute_transition_command(config: &Config, id: &str, status: &str) -> Result<()> {
    let to = parse_status(status)?;
    let updated = SuggestionMachine::from_config(config).transition(id, to)?;
    println!("{}: {}", updated.id, updated.status);
    Ok(())
}
