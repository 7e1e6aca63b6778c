#![deny(unsafe_code)]

//! Configuration loading and validation for kastatus.
//!
//! Loads TOML configuration files and validates them. [`AppConfig`] is the
//! central structure: the RPC endpoints of the `kadrx` and `ka_xmitd`
//! daemons, the retry policy applied to status queries, monitor cadence,
//! and logging.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// RPC endpoint of the `kadrx` radar controller.
    #[serde(default = "default_kadrx_endpoint")]
    pub kadrx: EndpointConfig,

    /// RPC endpoint of the `ka_xmitd` transmitter daemon.
    #[serde(default = "default_xmitd_endpoint")]
    pub xmitd: EndpointConfig,

    /// Retry policy for status queries.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Status monitor configuration.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            kadrx: default_kadrx_endpoint(),
            xmitd: default_xmitd_endpoint(),
            retry: RetryConfig::default(),
            monitor: MonitorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Address of one daemon's XML-RPC listener.
///
/// Fields omitted from a TOML table fall back to the generic defaults
/// (`localhost`, port 8081, `/RPC2`), so a `[xmitd]` section should name
/// its port explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Host name or IP address of the daemon.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port of the daemon's RPC listener.
    #[serde(default = "default_kadrx_port")]
    pub port: u16,

    /// HTTP path of the RPC handler.
    #[serde(default = "default_rpc_path")]
    pub path: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_kadrx_port() -> u16 {
    8081
}

fn default_xmitd_port() -> u16 {
    8080
}

fn default_rpc_path() -> String {
    "/RPC2".to_string()
}

fn default_kadrx_endpoint() -> EndpointConfig {
    EndpointConfig {
        host: default_host(),
        port: default_kadrx_port(),
        path: default_rpc_path(),
    }
}

fn default_xmitd_endpoint() -> EndpointConfig {
    EndpointConfig {
        host: default_host(),
        port: default_xmitd_port(),
        path: default_rpc_path(),
    }
}

/// Retry policy for status queries.
///
/// Attempt `n` (for `n >= 2`) waits `base_backoff_ms * backoff_multiplier^(n-2)`
/// before reconnecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per status query, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Factor applied to the delay after each further failure.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Timeout for each connect and each RPC call, in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    100
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_call_timeout_ms() -> u64 {
    2000
}

/// Status monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between status polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Age after which a snapshot is reported as stale, in seconds.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_stale_after_secs() -> u64 {
    5
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading configuration");
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint("kadrx", &self.kadrx)?;
        validate_endpoint("xmitd", &self.xmitd)?;

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation(format!(
                "retry.backoff_multiplier must be a finite value >= 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }
        if self.retry.call_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "retry.call_timeout_ms must be non-zero".to_string(),
            ));
        }

        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "monitor.poll_interval_ms must be non-zero".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

fn validate_endpoint(section: &str, endpoint: &EndpointConfig) -> Result<(), ConfigError> {
    if endpoint.host.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{section}.host must not be empty"
        )));
    }
    if endpoint.port == 0 {
        return Err(ConfigError::Validation(format!(
            "{section}.port must be non-zero"
        )));
    }
    if !endpoint.path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "{section}.path must start with '/', got {:?}",
            endpoint.path
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.kadrx.host, "localhost");
        assert_eq!(config.kadrx.port, 8081);
        assert_eq!(config.xmitd.port, 8080);
        assert_eq!(config.kadrx.path, "/RPC2");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.kadrx.port, 8081);
        assert_eq!(config.xmitd.port, 8080);
        assert_eq!(config.monitor.poll_interval_ms, 1000);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [kadrx]
            host = "drx.ka.net"
            port = 9081

            [xmitd]
            host = "xmitctl"
            port = 9080
            path = "/xmlrpc"

            [retry]
            max_attempts = 5
            base_backoff_ms = 250
            backoff_multiplier = 1.5
            call_timeout_ms = 500

            [monitor]
            poll_interval_ms = 2000
            stale_after_secs = 10

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.kadrx.host, "drx.ka.net");
        assert_eq!(config.kadrx.port, 9081);
        assert_eq!(config.kadrx.path, "/RPC2");
        assert_eq!(config.xmitd.path, "/xmlrpc");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_backoff_ms, 250);
        assert_eq!(config.retry.backoff_multiplier, 1.5);
        assert_eq!(config.retry.call_timeout_ms, 500);
        assert_eq!(config.monitor.stale_after_secs, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let toml = r#"
            [kadrx]
            port = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_host() {
        let toml = r#"
            [xmitd]
            host = ""
            port = 8080
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_relative_path() {
        let toml = r#"
            [kadrx]
            path = "RPC2"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let toml = r#"
            [retry]
            max_attempts = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_shrinking_backoff() {
        let toml = r#"
            [retry]
            backoff_multiplier = 0.5
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let toml = r#"
            [retry]
            call_timeout_ms = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_poll_interval() {
        let toml = r#"
            [monitor]
            poll_interval_ms = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        let toml = r#"
            [logging]
            level = "verbose"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = AppConfig::default();
        let s = toml::to_string_pretty(&config).unwrap();
        let parsed = AppConfig::parse(&s).unwrap();
        assert_eq!(parsed.kadrx, config.kadrx);
        assert_eq!(parsed.xmitd, config.xmitd);
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kastatus.toml");
        tokio::fs::write(&path, b"[kadrx]\nhost = \"drx\"\nport = 4242\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.kadrx.port, 4242);
        assert_eq!(config.kadrx.host, "drx");
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
