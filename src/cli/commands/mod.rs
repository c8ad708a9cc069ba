//! CLI command implementations.

mod common;
mod config;
mod observatory;
mod suggestions;
mod trace;

pub use config::execute_config_command;
pub use observatory::{
    execute_analyze_command, execute_converge_command, execute_report_command, execute_run_command,
    execute_suggest_command, execute_trend_command,
};
pub use suggestions::{execute_suggestions_command, execute_transition_command};
pub use trace::{
    execute_archive_command, execute_detect_command, execute_finalize_command, execute_heal_command,
    execute_init_command, execute_rebuild_index_command, execute_refinalize_command,
};
