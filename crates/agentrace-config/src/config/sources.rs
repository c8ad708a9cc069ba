use std::collections::BTreeMap;

use super::{Config, ConfigSource};

fn source_label(source: Option<&ConfigSource>) -> &'static str {
    match source.unwrap_or(&ConfigSource::Default) {
        ConfigSource::Cli => "cli",
        ConfigSource::Env => "env",
        ConfigSource::Config => "config",
        ConfigSource::Programmatic => "programmatic",
        ConfigSource::Default => "default",
    }
}

impl Config {
    /// Effective configuration as `key -> (value, source)`, for `agentrace config`.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut out = BTreeMap::new();
        let mut add = |key: &str, value: String| {
            let source = source_label(self.source_attribution.get(key)).to_string();
            out.insert(key.to_string(), (value, source));
        };

        add("store_root", self.paths.store_root.to_string());
        add("obs_dir", self.paths.obs_dir.to_string());
        add("state_file", self.paths.state_file.to_string());
        add("marker_dir", self.paths.marker_dir.to_string());
        if let Some(session) = &self.session_id {
            add("session_id", session.clone());
        }

        let t = &self.thresholds;
        add("compliance_threshold", t.compliance_threshold.to_string());
        add("slope_band", t.slope_band.to_string());
        add("trend_window", t.trend_window.to_string());
        add("cohort_min_points", t.cohort_min_points.to_string());
        add("improved_share", t.improved_share.to_string());
        add("timeout_secs", t.timeout_secs.to_string());
        add("marker_stale_secs", t.marker_stale_secs.to_string());
        add("trace_stale_secs", t.trace_stale_secs.to_string());

        add("compliance_artifacts", self.compliance.artifacts.join(", "));
        for (agent, artifacts) in &self.compliance.agents {
            let source = source_label(self.source_attribution.get("compliance_agents")).to_string();
            out.insert(format!("compliance.agents.{agent}"), (artifacts.join(", "), source));
        }

        out
    }
}
