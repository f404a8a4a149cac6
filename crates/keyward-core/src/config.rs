//! Runtime configuration.
//!
//! Loaded from TOML, then overlaid with `KEYWARD_*` environment variables, then
//! validated. The delay-notify window has no built-in default: it is a
//! deployment decision and must be present in the configuration.

use crate::errors::{KeywardError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `cosigner.base_url`.
pub const ENV_COSIGNER_URL: &str = "KEYWARD_COSIGNER_URL";
/// Environment variable overriding `build_variant`.
pub const ENV_BUILD_VARIANT: &str = "KEYWARD_BUILD_VARIANT";
/// Environment variable overriding `storage.base_path`.
pub const ENV_STORAGE_PATH: &str = "KEYWARD_STORAGE_PATH";

/// Distribution channel of the running build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildVariant {
    /// Public release
    Customer,
    /// External beta
    Beta,
    /// Internal team build
    Team,
    /// Local development
    Development,
}

impl BuildVariant {
    /// Whether delay windows may be overridden for testing.
    pub fn allows_delay_override(self) -> bool {
        !matches!(self, BuildVariant::Customer)
    }
}

impl std::str::FromStr for BuildVariant {
    type Err = KeywardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(BuildVariant::Customer),
            "beta" => Ok(BuildVariant::Beta),
            "team" => Ok(BuildVariant::Team),
            "development" | "dev" => Ok(BuildVariant::Development),
            other => Err(KeywardError::config(format!(
                "unknown build variant: {other}"
            ))),
        }
    }
}

/// Co-signer endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosignerConfig {
    /// Base URL, e.g. `https://api.example.com`
    pub base_url: String,
    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Delay-notify window settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayNotifyConfig {
    /// Window requested for new recoveries
    pub default_window_secs: u64,
    /// Shorter window for testing; ignored in customer builds
    #[serde(default)]
    pub window_override_secs: Option<u64>,
}

/// Retry policy for retryable co-signer failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay_ms: u64,
    /// Cap on any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
        }
    }
}

impl RetryConfig {
    /// Backoff before attempt `attempt` (1-based; attempt 1 has no delay).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let shift = (attempt - 2).min(16);
        let ms = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

/// Background worker intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Interval between recovery reconciliations
    pub recovery_sync_interval_ms: u64,
    /// Interval between funds-lost risk evaluations
    pub risk_poll_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            recovery_sync_interval_ms: 30_000,
            risk_poll_interval_ms: 60_000,
        }
    }
}

/// Local persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for persisted state
    pub base_path: PathBuf,
    /// Queue depth of the single-writer storage task
    pub channel_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./keyward-data"),
            channel_capacity: 64,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywardConfig {
    /// Build channel
    pub build_variant: BuildVariant,
    /// Co-signer endpoint
    pub cosigner: CosignerConfig,
    /// Delay-notify window
    pub delay_notify: DelayNotifyConfig,
    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,
    /// Worker intervals
    #[serde(default)]
    pub sync: SyncConfig,
    /// Persistence
    #[serde(default)]
    pub storage: StorageConfig,
}

impl KeywardConfig {
    /// Minimal configuration with defaults for everything optional.
    pub fn new(
        build_variant: BuildVariant,
        base_url: impl Into<String>,
        default_window: Duration,
    ) -> Self {
        Self {
            build_variant,
            cosigner: CosignerConfig {
                base_url: base_url.into(),
                request_timeout_ms: default_request_timeout_ms(),
            },
            delay_notify: DelayNotifyConfig {
                default_window_secs: default_window.as_secs(),
                window_override_secs: None,
            },
            retry: RetryConfig::default(),
            sync: SyncConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Parse from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| KeywardError::config(format!("Invalid TOML: {e}")))
    }

    /// Load from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KeywardError::config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Overlay `KEYWARD_*` variables from the process environment.
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Overlay `KEYWARD_*` variables from an explicit set.
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let value: String = value.into();
            match key.as_ref() {
                ENV_COSIGNER_URL => self.cosigner.base_url = value,
                ENV_BUILD_VARIANT => self.build_variant = value.parse()?,
                ENV_STORAGE_PATH => self.storage.base_path = PathBuf::from(value),
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.cosigner.base_url.trim().is_empty() {
            return Err(KeywardError::config("cosigner.base_url cannot be empty"));
        }
        if self.cosigner.request_timeout_ms == 0 {
            return Err(KeywardError::config(
                "cosigner.request_timeout_ms must be positive",
            ));
        }
        if self.delay_notify.default_window_secs == 0 {
            return Err(KeywardError::config(
                "delay_notify.default_window_secs must be positive",
            ));
        }
        if self.delay_notify.window_override_secs == Some(0) {
            return Err(KeywardError::config(
                "delay_notify.window_override_secs must be positive",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(KeywardError::config("retry.max_attempts must be at least 1"));
        }
        if self.sync.recovery_sync_interval_ms == 0 || self.sync.risk_poll_interval_ms == 0 {
            return Err(KeywardError::config("sync intervals must be positive"));
        }
        if self.storage.channel_capacity == 0 {
            return Err(KeywardError::config(
                "storage.channel_capacity must be positive",
            ));
        }
        if self.delay_notify.window_override_secs.is_some()
            && !self.build_variant.allows_delay_override()
        {
            tracing::warn!(
                variant = ?self.build_variant,
                "delay window override is ignored in customer builds"
            );
        }
        Ok(())
    }

    /// Window requested for new recoveries.
    pub fn effective_delay_window(&self) -> Duration {
        match self.delay_notify.window_override_secs {
            Some(secs) if self.build_variant.allows_delay_override() => Duration::from_secs(secs),
            _ => Duration::from_secs(self.delay_notify.default_window_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
build_variant = "team"

[cosigner]
base_url = "https://cosigner.test"

[delay_notify]
default_window_secs = 604800
window_override_secs = 20
"#;

    #[test]
    fn parses_toml_with_defaults() {
        let config = KeywardConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.build_variant, BuildVariant::Team);
        assert_eq!(config.cosigner.request_timeout_ms, 30_000);
        assert_eq!(config.retry, RetryConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn delay_window_is_required() {
        let missing = r#"
build_variant = "team"
[cosigner]
base_url = "https://cosigner.test"
[delay_notify]
"#;
        assert!(KeywardConfig::from_toml_str(missing).is_err());
    }

    #[test]
    fn override_only_applies_outside_customer_builds() {
        let mut config = KeywardConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.effective_delay_window(), Duration::from_secs(20));

        config.build_variant = BuildVariant::Customer;
        config.validate().unwrap();
        assert_eq!(config.effective_delay_window(), Duration::from_secs(604_800));
    }

    #[test]
    fn rejects_zero_values() {
        let mut config =
            KeywardConfig::new(BuildVariant::Development, "http://x", Duration::from_secs(1));
        config.delay_notify.default_window_secs = 0;
        assert!(config.validate().is_err());

        let mut config =
            KeywardConfig::new(BuildVariant::Development, "http://x", Duration::from_secs(1));
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let config = KeywardConfig::new(BuildVariant::Development, " ", Duration::from_secs(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overlay() {
        let mut config =
            KeywardConfig::new(BuildVariant::Team, "http://a", Duration::from_secs(10));
        config
            .merge_with_vars([
                (ENV_COSIGNER_URL, "http://b"),
                (ENV_BUILD_VARIANT, "customer"),
                (ENV_STORAGE_PATH, "/tmp/kw"),
                ("UNRELATED", "x"),
            ])
            .unwrap();
        assert_eq!(config.cosigner.base_url, "http://b");
        assert_eq!(config.build_variant, BuildVariant::Customer);
        assert_eq!(config.storage.base_path, PathBuf::from("/tmp/kw"));

        assert!(config
            .merge_with_vars([(ENV_BUILD_VARIANT, "nightly")])
            .is_err());
    }

    #[test]
    fn retry_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 500,
        };
        assert_eq!(retry.delay_before(1), Duration::ZERO);
        assert_eq!(retry.delay_before(2), Duration::from_millis(100));
        assert_eq!(retry.delay_before(3), Duration::from_millis(200));
        assert_eq!(retry.delay_before(4), Duration::from_millis(400));
        assert_eq!(retry.delay_before(5), Duration::from_millis(500));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = KeywardConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.cosigner.base_url, "https://cosigner.test");
        assert!(matches!(
            KeywardConfig::load_from_file(Path::new("/nonexistent/keyward.toml")),
            Err(KeywardError::Config { .. })
        ));
    }
}
