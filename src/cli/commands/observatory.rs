//! Observatory commands: analyze, trend, converge, suggest, run, report.

use agentrace_config::Config;
use agentrace_convergence::{ConvergenceEngine, ConvergenceReport};
use agentrace_metrics::{MetricsAnalyzer, load_snapshot};
use agentrace_suggest::{Suggestion, SuggestionMachine};
use agentrace_trace::TraceStore;
use agentrace_utils::types::MetricsSnapshot;
use anyhow::{Context, Result};

use super::common::{format_rate, print_json};
use crate::pipeline::Pipeline;

pub fn execute_analyze_command(config: &Config, json: bool) -> Result<()> {
    let report = MetricsAnalyzer::new(config)
        .analyze(&TraceStore::open(config), &SuggestionMachine::from_config(config))
        .context("Failed to analyze trace store")?;

    if json {
        return print_json(&report.snapshot);
    }
    println!(
        "metrics.json written: {} trace(s), {} history row(s)",
        report.snapshot.trace_count, report.history_rows
    );
    print_proposed(&report.proposed);
    Ok(())
}

pub fn execute_trend_command(
    config: &Config,
    agent: &str,
    artifact: &str,
    window: Option<usize>,
    json: bool,
) -> Result<()> {
    let report = ConvergenceEngine::from_config(config).trend(agent, artifact, window)?;
    if json {
        return print_json(&report);
    }
    let slope = report
        .slope
        .map_or_else(|| "-".to_string(), |s| format!("{s:+.3}"));
    println!(
        "{}: {} (slope {slope}, {} of {} point(s))",
        report.signal_id, report.trend, report.points, report.window
    );
    Ok(())
}

pub fn execute_converge_command(config: &Config, json: bool) -> Result<()> {
    let report = ConvergenceEngine::from_config(config)
        .converge()
        .context("Failed to evaluate convergence")?;
    if json {
        return print_json(&report);
    }
    print_convergence(&report);
    Ok(())
}

/// Propose from the existing snapshot without re-analyzing.
pub fn execute_suggest_command(config: &Config, json: bool) -> Result<()> {
    let snapshot = load_snapshot(&config.paths.metrics_file())?;
    let proposed = SuggestionMachine::from_config(config).suggest(&snapshot, &[])?;
    if json {
        return print_json(&proposed);
    }
    print_proposed(&proposed);
    if proposed.is_empty() {
        println!("no new suggestions");
    }
    Ok(())
}

pub fn execute_run_command(config: &Config, json: bool) -> Result<()> {
    let report = Pipeline::open(config)
        .run()
        .context("Pipeline run failed")?;
    if json {
        return print_json(&report);
    }
    println!(
        "analyzed {} trace(s) across {} agent type(s)",
        report.snapshot.trace_count,
        report.snapshot.by_agent_type.len()
    );
    print_convergence(&report.convergence);
    print_proposed(&report.proposed);
    Ok(())
}

pub fn execute_report_command(config: &Config, json: bool) -> Result<()> {
    let snapshot = load_snapshot(&config.paths.metrics_file())?;
    if json {
        return print_json(&snapshot);
    }
    print_snapshot(&snapshot);
    Ok(())
}

fn print_snapshot(snapshot: &MetricsSnapshot) {
    println!(
        "Metrics generated {} ({} trace(s))",
        snapshot.generated_at.to_rfc3339(),
        snapshot.trace_count
    );
    for (agent_type, metrics) in &snapshot.by_agent_type {
        println!();
        println!(
            "{agent_type}: {} trace(s), avg {:.0}s",
            metrics.count, metrics.avg_duration_s
        );
        let outcomes: Vec<String> = metrics
            .outcomes
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!("  outcomes: {}", outcomes.join(" "));
        for (artifact, m) in &metrics.compliance {
            println!(
                "  {artifact:<24} {:>7}  agent={} auto={} missing={}",
                format_rate(m.rate),
                m.agent,
                m.auto,
                m.missing
            );
            for (cause, n) in &m.root_causes {
                println!("    {cause}: {n}");
            }
        }
    }
}

fn print_convergence(report: &ConvergenceReport) {
    for t in &report.trends {
        println!("  trend {}: {}", t.signal_id, t.trend);
    }
    for v in &report.regressions {
        println!(
            "  ✗ {} ineffective ({} of {} post point(s) improved)",
            v.suggestion_id, v.improved_count, v.post_count
        );
    }
    for v in &report.converged {
        println!("  ✓ {} converged", v.suggestion_id);
    }
}

fn print_proposed(proposed: &[Suggestion]) {
    for s in proposed {
        println!("  + {} {}", s.id, s.title);
    }
}
