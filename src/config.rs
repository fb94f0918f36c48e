//! Configuration types for sftp-ingest
//!
//! Configuration is loaded by the embedding application (any serde format) and
//! checked with [`Config::validate`] before an [`Ingestor`](crate::Ingestor) is
//! built. The core treats a validated `Config` as read-only.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a batch run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote SFTP server and credentials
    pub remote: RemoteConfig,

    /// Absolute remote directories to walk
    #[serde(default)]
    pub roots: Vec<String>,

    /// File selection criteria
    #[serde(default)]
    pub filter: FilterConfig,

    /// Local paths (staging, validation log, database)
    #[serde(default)]
    pub local: LocalConfig,

    /// Worker pool and retry behavior
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Post-run notifications
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// SFTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Server hostname
    pub host: String,

    /// Server port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Private key file, tried before the password when set
    #[serde(default)]
    pub private_key: Option<PathBuf>,

    /// Passphrase for the private key
    #[serde(default)]
    pub private_key_passphrase: Option<String>,

    /// TCP connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Timeout for a single list/fetch call (default: 60 seconds)
    #[serde(default = "default_operation_timeout", with = "duration_serde")]
    pub operation_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: None,
            private_key: None,
            private_key_passphrase: None,
            connect_timeout: default_connect_timeout(),
            operation_timeout: default_operation_timeout(),
        }
    }
}

/// File selection criteria
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Substring the remote path must contain (case-insensitive)
    #[serde(default)]
    pub keyword: String,

    /// Required final extension, with or without the leading dot (default: ".csv")
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            extension: default_extension(),
        }
    }
}

/// Local filesystem locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Keep a copy of every retrieved file here (None = validate in memory only)
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// Structured validation log (default: "./validation.log")
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Results database (default: "./validation_results.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            staging_dir: None,
            log_file: default_log_file(),
            database_path: default_database_path(),
        }
    }
}

/// Worker pool configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrent workers (default: 5)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts to persist one outcome before aborting the run (default: 3)
    #[serde(default = "default_record_attempts")]
    pub record_attempts: u32,

    /// Retry policy for remote list/fetch/remove calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Remove each remote file once a non-error outcome for it is recorded
    /// (default: false)
    #[serde(default)]
    pub delete_after_fetch: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            record_attempts: default_record_attempts(),
            retry: RetryConfig::default(),
            delete_after_fetch: false,
        }
    }
}

/// Retry configuration for transient remote failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts (default: 1 second)
    #[serde(default = "default_base_delay", with = "millis_serde")]
    pub base_delay: Duration,

    /// Upper bound for a single delay (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "millis_serde")]
    pub max_delay: Duration,

    /// How the delay grows with each attempt
    #[serde(default)]
    pub backoff: Backoff,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            backoff: Backoff::default(),
            jitter: false,
        }
    }
}

/// Backoff function applied between retry attempts
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backoff {
    /// `base_delay * attempt` (default)
    #[default]
    Linear,
    /// `base_delay * multiplier^(attempt - 1)`
    Exponential {
        /// Growth factor between consecutive delays
        multiplier: f64,
    },
}

/// Notification configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhooks called once per completed run
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

/// Webhook configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL
    pub url: String,

    /// Request timeout (default: 30 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Optional value for the Authorization header
    #[serde(default)]
    pub auth_header: Option<String>,
}

impl Config {
    /// Reject malformed configuration before any remote or local resource is touched
    pub fn validate(&self) -> Result<()> {
        if self.remote.host.trim().is_empty() {
            return Err(Error::config("remote.host", "host must not be empty"));
        }
        if self.remote.port == 0 {
            return Err(Error::config("remote.port", "port must be non-zero"));
        }
        if self.remote.username.trim().is_empty() {
            return Err(Error::config("remote.username", "username must not be empty"));
        }
        if self.remote.password.is_none() && self.remote.private_key.is_none() {
            return Err(Error::config(
                "remote.password",
                "either a password or a private key is required",
            ));
        }

        if self.roots.is_empty() {
            return Err(Error::config("roots", "at least one root directory is required"));
        }
        for root in &self.roots {
            if !root.starts_with('/') {
                return Err(Error::config(
                    "roots",
                    format!("root directory must be absolute: {root}"),
                ));
            }
        }

        if self
            .filter
            .extension
            .trim()
            .trim_start_matches('.')
            .is_empty()
        {
            return Err(Error::config("filter.extension", "extension must not be empty"));
        }

        if self.local.log_file.as_os_str().is_empty() {
            return Err(Error::config("local.log_file", "log file path must not be empty"));
        }
        if self.local.database_path.as_os_str().is_empty() {
            return Err(Error::config(
                "local.database_path",
                "database path must not be empty",
            ));
        }

        if self.pipeline.concurrency == 0 {
            return Err(Error::config("pipeline.concurrency", "concurrency must be at least 1"));
        }
        if self.pipeline.record_attempts == 0 {
            return Err(Error::config(
                "pipeline.record_attempts",
                "record_attempts must be at least 1",
            ));
        }
        self.pipeline.retry.validate()?;

        for webhook in &self.notifications.webhooks {
            url::Url::parse(&webhook.url).map_err(|e| {
                Error::config(
                    "notifications.webhooks",
                    format!("invalid webhook URL {}: {e}", webhook.url),
                )
            })?;
        }

        Ok(())
    }
}

impl RetryConfig {
    /// Check the retry policy on its own
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config(
                "pipeline.retry.max_attempts",
                "max_attempts must be at least 1",
            ));
        }
        if let Backoff::Exponential { multiplier } = self.backoff {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(Error::config(
                    "pipeline.retry.backoff",
                    "exponential multiplier must be a finite number >= 1.0",
                ));
            }
        }
        Ok(())
    }
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_extension() -> String {
    ".csv".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("./validation.log")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./validation_results.db")
}

fn default_concurrency() -> usize {
    5
}

fn default_record_attempts() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Retry delays are short enough that whole seconds are too coarse
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            remote: RemoteConfig {
                host: "sftp.example.com".into(),
                port: 22,
                username: "ingest".into(),
                password: Some("secret".into()),
                ..Default::default()
            },
            roots: vec!["/data/incoming".into()],
            filter: FilterConfig {
                keyword: "target".into(),
                extension: ".csv".into(),
            },
            ..Default::default()
        }
    }

    fn error_key(err: Error) -> Option<String> {
        match err {
            Error::Config { key, .. } => key,
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn empty_host_is_rejected() {
        let mut config = valid_config();
        config.remote.host = "  ".into();
        assert_eq!(
            error_key(config.validate().unwrap_err()).as_deref(),
            Some("remote.host")
        );
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let mut config = valid_config();
        config.remote.password = None;
        assert_eq!(
            error_key(config.validate().unwrap_err()).as_deref(),
            Some("remote.password")
        );

        config.remote.private_key = Some(PathBuf::from("/home/ingest/.ssh/id_ed25519"));
        config.validate().unwrap();
    }

    #[test]
    fn roots_must_be_present_and_absolute() {
        let mut config = valid_config();
        config.roots.clear();
        assert_eq!(error_key(config.validate().unwrap_err()).as_deref(), Some("roots"));

        config.roots = vec!["data/incoming".into()];
        assert_eq!(error_key(config.validate().unwrap_err()).as_deref(), Some("roots"));
    }

    #[test]
    fn bare_dot_extension_is_rejected() {
        let mut config = valid_config();
        config.filter.extension = ".".into();
        assert_eq!(
            error_key(config.validate().unwrap_err()).as_deref(),
            Some("filter.extension")
        );
    }

    #[test]
    fn zero_concurrency_and_attempts_are_rejected() {
        let mut config = valid_config();
        config.pipeline.concurrency = 0;
        assert_eq!(
            error_key(config.validate().unwrap_err()).as_deref(),
            Some("pipeline.concurrency")
        );

        let mut config = valid_config();
        config.pipeline.retry.max_attempts = 0;
        assert_eq!(
            error_key(config.validate().unwrap_err()).as_deref(),
            Some("pipeline.retry.max_attempts")
        );

        let mut config = valid_config();
        config.pipeline.record_attempts = 0;
        assert_eq!(
            error_key(config.validate().unwrap_err()).as_deref(),
            Some("pipeline.record_attempts")
        );
    }

    #[test]
    fn shrinking_exponential_backoff_is_rejected() {
        let mut config = valid_config();
        config.pipeline.retry.backoff = Backoff::Exponential { multiplier: 0.5 };
        assert_eq!(
            error_key(config.validate().unwrap_err()).as_deref(),
            Some("pipeline.retry.backoff")
        );
    }

    #[test]
    fn malformed_webhook_url_is_rejected() {
        let mut config = valid_config();
        config.notifications.webhooks.push(WebhookConfig {
            url: "not a url".into(),
            timeout: Duration::from_secs(5),
            auth_header: None,
        });
        assert_eq!(
            error_key(config.validate().unwrap_err()).as_deref(),
            Some("notifications.webhooks")
        );
    }

    #[test]
    fn defaults_fill_in_missing_sections() {
        let json = r#"{
            "remote": { "host": "sftp.example.com", "username": "ingest", "password": "pw" },
            "roots": ["/data"]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.remote.port, 22);
        assert_eq!(config.filter.extension, ".csv");
        assert_eq!(config.pipeline.concurrency, 5);
        assert_eq!(config.pipeline.retry.max_attempts, 3);
        assert_eq!(config.pipeline.retry.base_delay, Duration::from_secs(1));
        assert_eq!(config.pipeline.retry.backoff, Backoff::Linear);
        assert!(!config.pipeline.delete_after_fetch);
        assert_eq!(config.local.log_file, PathBuf::from("./validation.log"));
        config.validate().unwrap();
    }

    #[test]
    fn retry_delays_serialize_as_millis() {
        let retry = RetryConfig {
            base_delay: Duration::from_millis(250),
            backoff: Backoff::Exponential { multiplier: 2.0 },
            ..RetryConfig::default()
        };
        let json = serde_json::to_value(&retry).unwrap();
        assert_eq!(json["base_delay"], 250);
        assert_eq!(json["max_delay"], 60_000);
        assert_eq!(json["backoff"]["kind"], "exponential");

        let back: RetryConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.base_delay, Duration::from_millis(250));
        assert_eq!(back.backoff, Backoff::Exponential { multiplier: 2.0 });
    }
}
