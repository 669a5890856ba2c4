use std::{env, sync::Arc, time::Duration};

use crate::{
    clock::{Clock, SystemClock},
    error::ConfigError,
};

/// How long buckets are kept when no retention is configured.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(15 * 60);

/// Construction options for [`crate::Benchmarks`].
#[derive(Debug, Clone)]
pub struct BenchmarksConfig {
    /// Buckets older than this are evicted on every update. This also caps the
    /// largest window `stats` can answer. Defaults to 15 minutes.
    pub retention: Duration,
    /// Where "now" comes from. Defaults to the system clock; only tests
    /// should need anything else.
    pub clock: Arc<dyn Clock>,
}

impl Default for BenchmarksConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            clock: Arc::new(SystemClock),
        }
    }
}

impl BenchmarksConfig {
    pub fn with_retention(self, retention: Duration) -> Self {
        Self { retention, ..self }
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ..self }
    }

    /// Buckets are one second wide, so anything shorter would retain nothing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention < Duration::from_secs(1) {
            return Err(ConfigError::RetentionTooShort(self.retention));
        }
        Ok(())
    }
}

/// Settings for the bundled server binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub retention: Duration,
}

const BIND_VAR: &str = "BENCHMARKS_BIND";
const RETENTION_VAR: &str = "BENCHMARKS_RETENTION_SECS";

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(env::var(BIND_VAR).ok(), env::var(RETENTION_VAR).ok())
    }

    fn from_vars(bind: Option<String>, retention: Option<String>) -> Result<Self, ConfigError> {
        let retention = match retention {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidVariable {
                    name: RETENTION_VAR,
                    value,
                })?,
            None => DEFAULT_RETENTION,
        };
        Ok(ServerConfig {
            bind: bind.unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            retention,
        })
    }

    pub fn benchmarks(&self) -> BenchmarksConfig {
        BenchmarksConfig::default().with_retention(self.retention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BenchmarksConfig::default();
        assert_eq!(config.retention, Duration::from_secs(900));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_short_retention() {
        for retention in [Duration::ZERO, Duration::from_millis(999)] {
            let config = BenchmarksConfig::default().with_retention(retention);
            assert!(matches!(
                config.validate(),
                Err(ConfigError::RetentionTooShort(r)) if r == retention
            ));
        }
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::from_vars(None, None).unwrap();
        assert_eq!(config.bind, "127.0.0.1:8080");
        assert_eq!(config.retention, DEFAULT_RETENTION);
    }

    #[test]
    fn test_server_config_from_vars() {
        let config =
            ServerConfig::from_vars(Some("0.0.0.0:9000".to_string()), Some(" 45 ".to_string()))
                .unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.benchmarks().retention, Duration::from_secs(45));
    }

    #[test]
    fn test_server_config_bad_retention() {
        let err = ServerConfig::from_vars(None, Some("soon".to_string())).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVariable { name: RETENTION_VAR, .. }
        ));
    }
}
