use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_disk_path")]
    pub disk_path: String,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
}

/// What the sampler does when a tick fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log, drop the tick, keep every stream open.
    #[default]
    Skip,
    /// Log and terminate the whole process.
    Exit,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ThresholdsConfig {
    #[serde(default)]
    pub cpu: ColorThresholds,
    #[serde(default)]
    pub temperature: ColorThresholds,
}

/// Values up to `warn` are green, up to `critical` orange, above that red.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ColorThresholds {
    pub warn: f64,
    pub critical: f64,
}

impl Default for ColorThresholds {
    fn default() -> Self {
        Self {
            warn: 50.0,
            critical: 90.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            disk_path: default_disk_path(),
            failure_policy: FailurePolicy::default(),
            keep_alive: default_keep_alive(),
            broadcast_capacity: default_broadcast_capacity(),
            thresholds: ThresholdsConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation("listen is required".to_string()));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a valid host:port address".to_string(),
            ));
        }
        if self.disk_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "disk_path must not be empty".to_string(),
            ));
        }
        if self.broadcast_capacity < 1 {
            return Err(ConfigError::Validation(
                "broadcast_capacity must be >= 1".to_string(),
            ));
        }
        if self.keep_alive_interval()? < Duration::from_secs(1) {
            return Err(ConfigError::Validation(
                "keep_alive must be at least 1s".to_string(),
            ));
        }

        validate_thresholds("thresholds.cpu", &self.thresholds.cpu)?;
        validate_thresholds("thresholds.temperature", &self.thresholds.temperature)?;

        Ok(())
    }

    pub fn keep_alive_interval(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(self.keep_alive.trim()).map_err(|err| {
            ConfigError::Validation(format!(
                "keep_alive '{}' is not a valid duration: {err}",
                self.keep_alive
            ))
        })
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_thresholds(field: &str, t: &ColorThresholds) -> Result<(), ConfigError> {
    if !t.warn.is_finite() || !t.critical.is_finite() {
        return Err(ConfigError::Validation(format!(
            "{field} values must be finite numbers"
        )));
    }
    if t.warn < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{field}.warn must be >= 0"
        )));
    }
    if t.warn > t.critical {
        return Err(ConfigError::Validation(format!(
            "{field}.warn must not exceed {field}.critical"
        )));
    }
    Ok(())
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_disk_path() -> String {
    "/".to_string()
}

fn default_keep_alive() -> String {
    "15s".to_string()
}

const fn default_broadcast_capacity() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().expect("default config should validate");
        assert_eq!(cfg.listen, "0.0.0.0:8080");
        assert_eq!(cfg.disk_path, "/");
        assert_eq!(cfg.failure_policy, FailurePolicy::Skip);
        assert_eq!(cfg.keep_alive_interval().unwrap(), Duration::from_secs(15));
    }

    #[test]
    fn example_yaml_parses_and_validates() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("example parses");
        cfg.validate().expect("example validates");
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let cfg: Config = serde_yaml::from_str("failure_policy: exit\n").unwrap();
        assert_eq!(cfg.failure_policy, FailurePolicy::Exit);
        assert_eq!(cfg.listen, "0.0.0.0:8080");
        assert_eq!(cfg.thresholds.cpu, ColorThresholds::default());
    }

    #[test]
    fn rejects_bad_listen_address() {
        let cfg = Config {
            listen: "not-an-address".to_string(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_unparseable_keep_alive() {
        let cfg = Config {
            keep_alive: "soon".to_string(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let cfg = Config {
            keep_alive: "200ms".to_string(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut cfg = Config::default();
        cfg.thresholds.temperature = ColorThresholds {
            warn: 80.0,
            critical: 60.0,
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::load_from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
