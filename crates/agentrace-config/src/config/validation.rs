use agentrace_utils::error::{AgentraceError, ConfigError};

use super::Config;

fn invalid(key: &str, value: impl Into<String>) -> AgentraceError {
    AgentraceError::Config(ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    })
}

fn check_fraction(key: &str, value: f64) -> Result<(), AgentraceError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(key, format!("{value} is outside 0.0..=1.0")));
    }
    Ok(())
}

fn check_positive_secs(key: &str, value: i64) -> Result<(), AgentraceError> {
    if value <= 0 {
        return Err(invalid(key, format!("{value} must be greater than 0 seconds")));
    }
    Ok(())
}

fn check_artifact_name(key: &str, name: &str) -> Result<(), AgentraceError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(invalid(key, format!("'{name}' is not a plain file name")));
    }
    Ok(())
}

impl Config {
    /// Validate configuration values
    pub(crate) fn validate(&self) -> Result<(), AgentraceError> {
        let t = &self.thresholds;

        check_fraction("compliance_threshold", t.compliance_threshold)?;
        check_fraction("improved_share", t.improved_share)?;

        if !(0.0..1.0).contains(&t.slope_band) {
            return Err(invalid("slope_band", format!("{} is outside 0.0..1.0", t.slope_band)));
        }
        if t.trend_window < 2 {
            return Err(invalid("trend_window", format!("{} is below the minimum of 2", t.trend_window)));
        }
        if t.cohort_min_points == 0 {
            return Err(invalid("cohort_min_points", "must be greater than 0"));
        }

        check_positive_secs("timeout_secs", t.timeout_secs)?;
        check_positive_secs("marker_stale_secs", t.marker_stale_secs)?;
        check_positive_secs("trace_stale_secs", t.trace_stale_secs)?;

        if self.compliance.artifacts.is_empty() {
            return Err(invalid("compliance_artifacts", "at least one artifact is required"));
        }
        for name in &self.compliance.artifacts {
            check_artifact_name("compliance_artifacts", name)?;
        }
        for (agent, artifacts) in &self.compliance.agents {
            let key = format!("compliance.agents.{agent}");
            if artifacts.is_empty() {
                return Err(invalid(&key, "at least one artifact is required"));
            }
            for name in artifacts {
                check_artifact_name(&key, name)?;
            }
        }

        if self.session_id.as_deref().is_some_and(|s| s.contains(['/', '\\'])) {
            return Err(invalid("session_id", "must not contain path separators"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config::builder()
            .store_root("/tmp/traces")
            .obs_dir("/tmp/obs")
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut c = base();
        c.thresholds.trend_window = 1;
        assert!(c.validate().is_err());

        let mut c = base();
        c.thresholds.slope_band = -0.1;
        assert!(c.validate().is_err());

        let mut c = base();
        c.thresholds.trace_stale_secs = 0;
        assert!(c.validate().is_err());

        let mut c = base();
        c.compliance.artifacts = vec!["../escape".into()];
        assert!(c.validate().is_err());

        let mut c = base();
        c.compliance.agents.insert("reviewer".into(), vec![]);
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_threshold_bounds_are_inclusive() {
        let mut c = base();
        c.thresholds.compliance_threshold = 1.0;
        c.thresholds.improved_share = 0.0;
        assert!(c.validate().is_ok());
    }
}
