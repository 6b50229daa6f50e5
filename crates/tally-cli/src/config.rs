//! Monitor configuration: an optional TOML file layered under CLI flags.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use serde::Deserialize;

use tally_accountant::{LabelFilter, Pacing, ResetPolicy, DEFAULT_EXCLUDED_NAMESPACE};
use tally_scrape::DEFAULT_TIMEOUT;

pub const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:63626/metrics";

/// How to treat a counter that goes down between samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    /// Count the new value as the increase since the restart.
    Rebase,
    /// Skip the interval and take the new value as the baseline.
    Ignore,
    /// Subtract the decrease from the total.
    Subtract,
}

impl From<ResetMode> for ResetPolicy {
    fn from(mode: ResetMode) -> Self {
        match mode {
            ResetMode::Rebase => ResetPolicy::Rebase,
            ResetMode::Ignore => ResetPolicy::Ignore,
            ResetMode::Subtract => ResetPolicy::Subtract,
        }
    }
}

/// One layer of settings. Unset fields fall through to the layer below.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub time_window_seconds: Option<u64>,
    pub prometheus_url: Option<String>,
    pub included_namespace: Option<String>,
    pub excluded_namespace: Option<String>,
    pub on_reset: Option<ResetMode>,
    pub compensate_drift: Option<bool>,
    pub timeout_seconds: Option<u64>,
}

impl Settings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(settings)
    }

    /// Layer `overrides` on top of `self`.
    pub fn merge(self, overrides: Settings) -> Settings {
        Settings {
            time_window_seconds: overrides.time_window_seconds.or(self.time_window_seconds),
            prometheus_url: overrides.prometheus_url.or(self.prometheus_url),
            included_namespace: overrides.included_namespace.or(self.included_namespace),
            excluded_namespace: overrides.excluded_namespace.or(self.excluded_namespace),
            on_reset: overrides.on_reset.or(self.on_reset),
            compensate_drift: overrides.compensate_drift.or(self.compensate_drift),
            timeout_seconds: overrides.timeout_seconds.or(self.timeout_seconds),
        }
    }

    /// Fill in defaults. Returns `None` without a usable time window.
    pub fn resolve(self) -> Option<MonitorConfig> {
        let window_secs = self.time_window_seconds.filter(|&secs| secs > 0)?;

        Some(MonitorConfig {
            window_secs,
            prometheus_url: self
                .prometheus_url
                .unwrap_or_else(|| DEFAULT_PROMETHEUS_URL.to_string()),
            filter: LabelFilter::new(
                self.included_namespace,
                self.excluded_namespace
                    .unwrap_or_else(|| DEFAULT_EXCLUDED_NAMESPACE.to_string()),
            ),
            reset_policy: self.on_reset.map(ResetPolicy::from).unwrap_or_default(),
            pacing: if self.compensate_drift.unwrap_or(false) {
                Pacing::Compensated
            } else {
                Pacing::Fixed
            },
            timeout: self
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        })
    }
}

/// Fully resolved settings for one monitoring run.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub window_secs: u64,
    pub prometheus_url: String,
    pub filter: LabelFilter,
    pub reset_policy: ResetPolicy,
    pub pacing: Pacing,
    pub timeout: Duration,
}

impl MonitorConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn resolve_applies_defaults() {
        let config = Settings {
            time_window_seconds: Some(120),
            ..Settings::default()
        }
        .resolve()
        .unwrap();

        assert_eq!(config.window(), Duration::from_secs(120));
        assert_eq!(config.prometheus_url, DEFAULT_PROMETHEUS_URL);
        assert_eq!(config.filter, LabelFilter::default());
        assert_eq!(config.reset_policy, ResetPolicy::Rebase);
        assert_eq!(config.pacing, Pacing::Fixed);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn resolve_without_window_is_none() {
        assert!(Settings::default().resolve().is_none());
    }

    #[test]
    fn resolve_zero_window_is_none() {
        let settings = Settings {
            time_window_seconds: Some(0),
            ..Settings::default()
        };
        assert!(settings.resolve().is_none());
    }

    #[test]
    fn resolve_empty_included_namespace_means_all() {
        let config = Settings {
            time_window_seconds: Some(5),
            included_namespace: Some(String::new()),
            ..Settings::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(config.filter.include(), None);
    }

    #[test]
    fn merge_prefers_overrides() {
        let file = Settings {
            time_window_seconds: Some(60),
            prometheus_url: Some("http://file:9090/metrics".to_string()),
            on_reset: Some(ResetMode::Subtract),
            ..Settings::default()
        };
        let cli = Settings {
            time_window_seconds: Some(30),
            included_namespace: Some("orders".to_string()),
            ..Settings::default()
        };

        let merged = file.merge(cli);
        assert_eq!(merged.time_window_seconds, Some(30));
        assert_eq!(merged.prometheus_url.as_deref(), Some("http://file:9090/metrics"));
        assert_eq!(merged.included_namespace.as_deref(), Some("orders"));
        assert_eq!(merged.on_reset, Some(ResetMode::Subtract));
    }

    #[test]
    fn from_file_parses_all_keys() {
        let file = write_config(
            r#"
time_window_seconds = 90
prometheus_url = "http://temporal:9090/metrics"
included_namespace = "default"
excluded_namespace = "internal"
on_reset = "ignore"
compensate_drift = true
timeout_seconds = 3
"#,
        );

        let config = Settings::from_file(file.path()).unwrap().resolve().unwrap();
        assert_eq!(config.window_secs, 90);
        assert_eq!(config.prometheus_url, "http://temporal:9090/metrics");
        assert_eq!(config.filter.include(), Some("default"));
        assert_eq!(config.filter.exclude(), "internal");
        assert_eq!(config.reset_policy, ResetPolicy::Ignore);
        assert_eq!(config.pacing, Pacing::Compensated);
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn from_file_rejects_unknown_keys() {
        let file = write_config("time_window = 10\n");
        let err = Settings::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("invalid config file"));
    }

    #[test]
    fn from_file_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
