use agentrace_utils::error::Result;
use camino::Utf8PathBuf;
use std::collections::{BTreeMap, HashMap};

use super::{ComplianceSchema, Config, ConfigSource, PathsConfig, Thresholds};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// Nothing is read from the environment or from config files.
    ///
    /// ```rust
    /// use agentrace_config::Config;
    ///
    /// let config = Config::builder()
    ///     .store_root("/srv/agentrace/traces")
    ///     .obs_dir("/srv/agentrace/observatory")
    ///     .compliance_threshold(0.7)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.paths.state_file, "/srv/agentrace/observatory/state.json");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Fluent construction of a [`Config`]. Every value set here is attributed
/// to [`ConfigSource::Programmatic`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    store_root: Option<Utf8PathBuf>,
    obs_dir: Option<Utf8PathBuf>,
    state_file: Option<Utf8PathBuf>,
    marker_dir: Option<Utf8PathBuf>,
    session_id: Option<String>,
    thresholds: Thresholds,
    touched: Vec<&'static str>,
    artifacts: Option<Vec<String>>,
    agents: BTreeMap<String, Vec<String>>,
}

macro_rules! threshold_setter {
    ($name:ident, $ty:ty) => {
        #[must_use]
        pub fn $name(mut self, value: $ty) -> Self {
            self.thresholds.$name = value;
            self.touched.push(stringify!($name));
            self
        }
    };
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn store_root(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.store_root = Some(path.into());
        self
    }

    #[must_use]
    pub fn obs_dir(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.obs_dir = Some(path.into());
        self
    }

    /// Override the state file location (default: `{obs_dir}/state.json`).
    #[must_use]
    pub fn state_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Override the marker directory (default: `{store_root}/.markers`).
    #[must_use]
    pub fn marker_dir(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.marker_dir = Some(path.into());
        self
    }

    #[must_use]
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    threshold_setter!(compliance_threshold, f64);
    threshold_setter!(slope_band, f64);
    threshold_setter!(trend_window, usize);
    threshold_setter!(cohort_min_points, usize);
    threshold_setter!(improved_share, f64);
    threshold_setter!(timeout_secs, i64);
    threshold_setter!(marker_stale_secs, i64);
    threshold_setter!(trace_stale_secs, i64);

    /// Replace the default expected-artifact list.
    #[must_use]
    pub fn compliance_artifacts<I, S>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artifacts = Some(artifacts.into_iter().map(Into::into).collect());
        self
    }

    /// Expected artifacts for a single agent type.
    #[must_use]
    pub fn agent_artifacts<I, S>(mut self, agent_type: impl Into<String>, artifacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agents.insert(
            agent_type.into(),
            artifacts.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Build and validate.
    ///
    /// Unset store and observatory paths fall back to the home-directory
    /// defaults used by discovery.
    pub fn build(self) -> Result<Config> {
        let mut source_attribution = HashMap::new();
        let programmatic = |attr: &mut HashMap<String, ConfigSource>, key: &str, set: bool| {
            let source = if set {
                ConfigSource::Programmatic
            } else {
                ConfigSource::Default
            };
            attr.insert(key.to_string(), source);
        };

        programmatic(&mut source_attribution, "store_root", self.store_root.is_some());
        programmatic(&mut source_attribution, "obs_dir", self.obs_dir.is_some());
        programmatic(&mut source_attribution, "state_file", self.state_file.is_some());
        programmatic(&mut source_attribution, "marker_dir", self.marker_dir.is_some());
        programmatic(&mut source_attribution, "compliance_artifacts", self.artifacts.is_some());
        for key in [
            "compliance_threshold",
            "slope_band",
            "trend_window",
            "cohort_min_points",
            "improved_share",
            "timeout_secs",
            "marker_stale_secs",
            "trace_stale_secs",
        ] {
            programmatic(&mut source_attribution, key, self.touched.contains(&key));
        }
        if self.session_id.is_some() {
            source_attribution.insert("session_id".to_string(), ConfigSource::Programmatic);
        }

        let store_root = match self.store_root {
            Some(p) => p,
            None => super::discovery::default_home_dir("store_root")?.join("traces"),
        };
        let obs_dir = match self.obs_dir {
            Some(p) => p,
            None => super::discovery::default_home_dir("obs_dir")?.join("observatory"),
        };

        let mut paths = PathsConfig::new(store_root, obs_dir);
        if let Some(p) = self.state_file {
            paths.state_file = p;
        }
        if let Some(p) = self.marker_dir {
            paths.marker_dir = p;
        }

        let mut compliance = ComplianceSchema::default();
        if let Some(artifacts) = self.artifacts {
            compliance.artifacts = artifacts;
        }
        compliance.agents = self.agents;

        let config = Config {
            paths,
            thresholds: self.thresholds,
            compliance,
            session_id: self.session_id,
            source_attribution,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_attributes_programmatic_values() {
        let config = Config::builder()
            .store_root("/t")
            .obs_dir("/o")
            .trend_window(8)
            .session_id("s-1")
            .build()
            .unwrap();

        assert_eq!(config.thresholds.trend_window, 8);
        assert_eq!(config.source_attribution["trend_window"], ConfigSource::Programmatic);
        assert_eq!(config.source_attribution["cohort_min_points"], ConfigSource::Default);
        assert_eq!(config.source_attribution["state_file"], ConfigSource::Default);
        assert_eq!(config.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::builder()
            .store_root("/t")
            .obs_dir("/o")
            .state_file("/elsewhere/state.json")
            .marker_dir("/run/markers")
            .compliance_artifacts(["summary.md"])
            .agent_artifacts("tester", ["summary.md", "test-output.txt"])
            .build()
            .unwrap();

        assert_eq!(config.paths.state_file, "/elsewhere/state.json");
        assert_eq!(config.paths.marker_dir, "/run/markers");
        assert_eq!(config.compliance.artifacts_for("tester").len(), 2);
        assert_eq!(config.compliance.artifacts_for("other").len(), 1);
    }

    #[test]
    fn test_builder_validates() {
        let result = Config::builder()
            .store_root("/t")
            .obs_dir("/o")
            .improved_share(2.0)
            .build();
        assert!(result.is_err());
    }
}
