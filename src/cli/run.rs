//! CLI entry point and dispatch
//!
//! `run()` parses arguments, installs logging, discovers configuration,
//! dispatches to a handler and owns all error output.

use agentrace_config::{CliArgs, Config};
use agentrace_utils::error::{AgentraceError, ConfigError};
use agentrace_utils::exit_codes::ExitCode;
use agentrace_utils::logging::{LogFormat, init_tracing};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use std::path::PathBuf;

use super::args::{Cli, Commands};
use super::commands;

/// Main CLI execution function.
///
/// Prints command output and errors itself; `main` only maps the returned
/// code to the process exit status.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    if let Err(e) = init_tracing(cli.verbose, format) {
        eprintln!("warning: logging disabled: {e}");
    }

    let operation = cli.command.operation();
    let config = match build_cli_args(&cli).and_then(|args| {
        Config::discover(&args).context("Failed to load configuration")
    }) {
        Ok(config) => config,
        Err(err) => return Err(report_error(&err, "config")),
    };
    tracing::debug!(
        store_root = %config.paths.store_root,
        obs_dir = %config.paths.obs_dir,
        operation,
        "configuration loaded"
    );

    dispatch(cli.command, &config).map_err(|err| report_error(&err, operation))
}

fn dispatch(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Init { agent, project } => commands::execute_init_command(config, &agent, project),
        Commands::Detect { agent, project } => commands::execute_detect_command(config, &agent, project),
        Commands::Finalize {
            trace_id,
            agent,
            project,
            json,
        } => commands::execute_finalize_command(config, &trace_id, &agent, project, json),
        Commands::Refinalize { trace_id, all } => {
            commands::execute_refinalize_command(config, trace_id.as_deref(), all)
        }
        Commands::RebuildIndex => commands::execute_rebuild_index_command(config),
        Commands::Heal => commands::execute_heal_command(config),
        Commands::Archive {
            before,
            older_than_days,
        } => commands::execute_archive_command(config, before.as_deref(), older_than_days),
        Commands::Analyze { json } => commands::execute_analyze_command(config, json),
        Commands::Trend {
            agent,
            artifact,
            window,
            json,
        } => commands::execute_trend_command(config, &agent, &artifact, window, json),
        Commands::Converge { json } => commands::execute_converge_command(config, json),
        Commands::Suggest { json } => commands::execute_suggest_command(config, json),
        Commands::Run { json } => commands::execute_run_command(config, json),
        Commands::Suggestions { status, json } => {
            commands::execute_suggestions_command(config, status.as_deref(), json)
        }
        Commands::Transition { id, status } => commands::execute_transition_command(config, &id, &status),
        Commands::Report { json } => commands::execute_report_command(config, json),
        Commands::Config { json } => commands::execute_config_command(config, json),
    }
}

fn utf8(path: Option<&PathBuf>, flag: &str) -> Result<Option<Utf8PathBuf>> {
    path.map(|p| {
        Utf8PathBuf::try_from(p.clone()).map_err(|e| {
            anyhow::Error::from(AgentraceError::from(ConfigError::InvalidValue {
                key: flag.to_string(),
                value: format!("{} (not valid UTF-8)", e.as_path().display()),
            }))
        })
    })
    .transpose()
}

fn build_cli_args(cli: &Cli) -> Result<CliArgs> {
    Ok(CliArgs {
        config_path: utf8(cli.config.as_ref(), "config")?,
        store_root: utf8(cli.store_root.as_ref(), "store-root")?,
        obs_dir: utf8(cli.obs_dir.as_ref(), "obs-dir")?,
        state_file: utf8(cli.state_file.as_ref(), "state-file")?,
        marker_dir: utf8(cli.marker_dir.as_ref(), "marker-dir")?,
        session_id: cli.session_id.clone(),
    })
}

/// Print an error for the user and pick the exit code.
///
/// Library errors carry their own message, context and suggestions; anything
/// else is reported with its context chain.
fn report_error(error: &anyhow::Error, operation: &str) -> ExitCode {
    if let Some(err) = error.downcast_ref::<AgentraceError>() {
        eprintln!("✗ {operation} failed");
        eprint!("{}", err.display_for_user());
        return err.to_exit_code();
    }

    eprintln!("✗ {operation} failed: {error}");
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
    eprintln!("\n  Run with --verbose for more detailed output");
    ExitCode::INTERNAL
}
