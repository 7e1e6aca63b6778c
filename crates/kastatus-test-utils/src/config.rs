//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::PathBuf;

use kastatus_config::AppConfig;
use kastatus_core::Endpoint;
use tempfile::TempDir;

/// Fluent builder for [`AppConfig`] in tests.
///
/// Retry timing defaults to a fast policy (10 ms base backoff, 500 ms call
/// timeout) so tests that hit a real socket stay quick.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .kadrx_endpoint(&daemon.endpoint())
///     .max_attempts(1)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.retry.base_backoff_ms = 10;
        config.retry.call_timeout_ms = 500;
        Self { config }
    }

    pub fn kadrx_endpoint(mut self, endpoint: &Endpoint) -> Self {
        self.config.kadrx.host = endpoint.host.clone();
        self.config.kadrx.port = endpoint.port;
        self.config.kadrx.path = endpoint.path.clone();
        self
    }

    pub fn xmitd_endpoint(mut self, endpoint: &Endpoint) -> Self {
        self.config.xmitd.host = endpoint.host.clone();
        self.config.xmitd.port = endpoint.port;
        self.config.xmitd.path = endpoint.path.clone();
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn base_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_backoff_ms = ms;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.retry.backoff_multiplier = multiplier;
        self
    }

    pub fn call_timeout_ms(mut self, ms: u64) -> Self {
        self.config.retry.call_timeout_ms = ms;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.monitor.poll_interval_ms = ms;
        self
    }

    pub fn stale_after_secs(mut self, secs: u64) -> Self {
        self.config.monitor.stale_after_secs = secs;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A TOML config file in a temp directory, deleted on drop.
pub struct TempConfigFile {
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TempConfigFile {
    pub async fn with_toml(toml_content: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("kastatus.toml");
        tokio::fs::write(&path, toml_content)
            .await
            .expect("failed to write test config");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }
}
