use agentrace_utils::error::{AgentraceError, ConfigError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use super::{CliArgs, ComplianceSchema, Config, ConfigSource, EnvOverrides, PathsConfig, Thresholds};

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    paths: Option<TomlPaths>,
    thresholds: Option<TomlThresholds>,
    compliance: Option<TomlCompliance>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlPaths {
    store_root: Option<Utf8PathBuf>,
    obs_dir: Option<Utf8PathBuf>,
    state_file: Option<Utf8PathBuf>,
    marker_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlThresholds {
    compliance_threshold: Option<f64>,
    slope_band: Option<f64>,
    trend_window: Option<usize>,
    cohort_min_points: Option<usize>,
    improved_share: Option<f64>,
    timeout_secs: Option<i64>,
    marker_stale_secs: Option<i64>,
    trace_stale_secs: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlCompliance {
    artifacts: Option<Vec<String>>,
    agents: Option<BTreeMap<String, Vec<String>>>,
}

impl Config {
    /// Discover configuration from the current directory and process environment.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| AgentraceError::io(".", e))?;
        let start_dir = Utf8PathBuf::from_path_buf(cwd).map_err(|p| {
            ConfigError::NoDefault {
                key: "current_dir".to_string(),
                reason: format!("{} is not valid UTF-8", p.display()),
            }
        })?;
        Self::discover_with(&start_dir, cli_args, &EnvOverrides::from_process_env())
    }

    /// Discover configuration starting from `start_dir` with explicit
    /// environment overrides, so tests never touch process-global state.
    pub fn discover_with(start_dir: &Utf8Path, cli_args: &CliArgs, env: &EnvOverrides) -> Result<Self> {
        let mut source_attribution = HashMap::new();
        let mut thresholds = Thresholds::default();
        let mut compliance = ComplianceSchema::default();
        let mut file_paths = TomlPaths::default();

        for key in [
            "compliance_threshold",
            "slope_band",
            "trend_window",
            "cohort_min_points",
            "improved_share",
            "timeout_secs",
            "marker_stale_secs",
            "trace_stale_secs",
            "compliance_artifacts",
        ] {
            source_attribution.insert(key.to_string(), ConfigSource::Default);
        }

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.is_file() {
                    return Err(ConfigError::NotFound {
                        path: explicit.to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_path {
            tracing::debug!(config = %path, "loading configuration file");
            let file_config = Self::load_config_file(path)?;
            let base = config_base_dir(path);

            if let Some(paths) = file_config.paths {
                let resolve = |p: Option<Utf8PathBuf>| p.map(|p| resolve_relative(&base, p));
                file_paths = TomlPaths {
                    store_root: resolve(paths.store_root),
                    obs_dir: resolve(paths.obs_dir),
                    state_file: resolve(paths.state_file),
                    marker_dir: resolve(paths.marker_dir),
                };
            }

            if let Some(file_thresholds) = file_config.thresholds {
                macro_rules! apply {
                    ($($field:ident),*) => {$(
                        if let Some(v) = file_thresholds.$field {
                            thresholds.$field = v;
                            source_attribution.insert(stringify!($field).to_string(), ConfigSource::Config);
                        }
                    )*};
                }
                apply!(
                    compliance_threshold,
                    slope_band,
                    trend_window,
                    cohort_min_points,
                    improved_share,
                    timeout_secs,
                    marker_stale_secs,
                    trace_stale_secs
                );
            }

            if let Some(file_compliance) = file_config.compliance {
                if let Some(artifacts) = file_compliance.artifacts {
                    compliance.artifacts = artifacts;
                    source_attribution.insert("compliance_artifacts".to_string(), ConfigSource::Config);
                }
                if let Some(agents) = file_compliance.agents {
                    compliance.agents = agents;
                    source_attribution.insert("compliance_agents".to_string(), ConfigSource::Config);
                }
            }
        }

        let mut layered = |key: &str,
                           cli: &Option<Utf8PathBuf>,
                           env: &Option<Utf8PathBuf>,
                           file: Option<Utf8PathBuf>|
         -> Option<Utf8PathBuf> {
            let (value, source) = if let Some(v) = cli {
                (v.clone(), ConfigSource::Cli)
            } else if let Some(v) = env {
                (v.clone(), ConfigSource::Env)
            } else {
                (file?, ConfigSource::Config)
            };
            source_attribution.insert(key.to_string(), source);
            Some(value)
        };

        let store_root = layered("store_root", &cli_args.store_root, &env.store_root, file_paths.store_root);
        let obs_dir = layered("obs_dir", &cli_args.obs_dir, &env.obs_dir, file_paths.obs_dir);
        let state_file = layered("state_file", &cli_args.state_file, &env.state_file, file_paths.state_file);
        let marker_dir = layered("marker_dir", &cli_args.marker_dir, &env.marker_dir, file_paths.marker_dir);

        let store_root = match store_root {
            Some(p) => p,
            None => {
                source_attribution.insert("store_root".to_string(), ConfigSource::Default);
                default_home_dir("store_root")?.join("traces")
            }
        };
        let obs_dir = match obs_dir {
            Some(p) => p,
            None => {
                source_attribution.insert("obs_dir".to_string(), ConfigSource::Default);
                default_home_dir("obs_dir")?.join("observatory")
            }
        };

        let mut paths = PathsConfig::new(store_root, obs_dir);
        match state_file {
            Some(p) => paths.state_file = p,
            None => {
                source_attribution.insert("state_file".to_string(), ConfigSource::Default);
            }
        }
        match marker_dir {
            Some(p) => paths.marker_dir = p,
            None => {
                source_attribution.insert("marker_dir".to_string(), ConfigSource::Default);
            }
        }

        let session_id = match (&cli_args.session_id, &env.session_id) {
            (Some(s), _) => {
                source_attribution.insert("session_id".to_string(), ConfigSource::Cli);
                Some(s.clone())
            }
            (None, Some(s)) => {
                source_attribution.insert("session_id".to_string(), ConfigSource::Env);
                Some(s.clone())
            }
            (None, None) => None,
        };

        let config = Self {
            paths,
            thresholds,
            compliance,
            session_id,
            source_attribution,
        };

        config.validate()?;

        Ok(config)
    }

    /// Walk up from `start_dir` looking for `.agentrace/config.toml`, stopping
    /// at a repository root (.git, .hg, .svn) or the filesystem root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Utf8Path) -> Option<Utf8PathBuf> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            let candidate = dir.join(".agentrace").join("config.toml");
            if candidate.is_file() {
                return Some(candidate);
            }
            if [".git", ".hg", ".svn"].iter().any(|m| dir.join(m).exists()) {
                break;
            }
            current = dir.parent();
        }

        None
    }

    fn load_config_file(path: &Utf8Path) -> Result<TomlConfig> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(TomlConfig::default()),
            Err(e) => return Err(AgentraceError::io(path, e)),
        };
        toml::from_str(&content).map_err(|e| {
            ConfigError::InvalidFile {
                path: path.to_string(),
                reason: e.message().to_string(),
            }
            .into()
        })
    }
}

/// Relative paths in a config file resolve against the directory that holds
/// `.agentrace/`, i.e. the project root.
fn config_base_dir(config_path: &Utf8Path) -> Utf8PathBuf {
    let parent = config_path.parent().unwrap_or_else(|| Utf8Path::new("."));
    if parent.file_name() == Some(".agentrace") {
        parent.parent().unwrap_or(parent).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

fn resolve_relative(base: &Utf8Path, path: Utf8PathBuf) -> Utf8PathBuf {
    if path.is_absolute() { path } else { base.join(path) }
}

pub(super) fn default_home_dir(key: &str) -> Result<Utf8PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| ConfigError::NoDefault {
        key: key.to_string(),
        reason: "home directory could not be determined".to_string(),
    })?;
    let home = Utf8PathBuf::from_path_buf(home).map_err(|p| ConfigError::NoDefault {
        key: key.to_string(),
        reason: format!("home directory {} is not valid UTF-8", p.display()),
    })?;
    Ok(home.join(".agentrace"))
}
