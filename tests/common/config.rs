//! Test configuration helpers: temp-dir configs and .env credentials for live runs

use sftp_ingest::{Config, FilterConfig, LocalConfig, PipelineConfig, RemoteConfig, RetryConfig};
use std::time::Duration;
use tempfile::TempDir;

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Config for in-memory runs: local files under `dir`, millisecond retry delays
pub fn memory_config(dir: &TempDir, roots: &[&str], keyword: &str) -> Config {
    Config {
        remote: RemoteConfig {
            host: "memory.invalid".to_string(),
            username: "ingest".to_string(),
            password: Some("unused".to_string()),
            ..Default::default()
        },
        roots: roots.iter().map(|r| r.to_string()).collect(),
        filter: FilterConfig {
            keyword: keyword.to_string(),
            extension: ".csv".to_string(),
        },
        local: LocalConfig {
            staging_dir: None,
            log_file: dir.path().join("validation.log"),
            database_path: dir.path().join("validation_results.db"),
        },
        pipeline: PipelineConfig {
            concurrency: 3,
            record_attempts: 2,
            retry: RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                ..Default::default()
            },
            delete_after_fetch: false,
        },
        ..Default::default()
    }
}

/// Load SFTP server configuration from environment variables
///
/// Required environment variables:
/// - `SFTP_HOST` - Server hostname
/// - `SFTP_USERNAME` - Authentication username
/// - `SFTP_PASSWORD` - Authentication password
///
/// Optional environment variables:
/// - `SFTP_PORT` - Port (default: 22)
pub fn load_remote_config() -> Result<RemoteConfig, ConfigError> {
    dotenvy::dotenv().ok();

    let host = std::env::var("SFTP_HOST")
        .map_err(|_| ConfigError("SFTP_HOST not set in environment".to_string()))?;

    let port: u16 = std::env::var("SFTP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(22);

    let username = std::env::var("SFTP_USERNAME")
        .map_err(|_| ConfigError("SFTP_USERNAME not set in environment".to_string()))?;

    let password = std::env::var("SFTP_PASSWORD")
        .map_err(|_| ConfigError("SFTP_PASSWORD not set in environment".to_string()))?;

    Ok(RemoteConfig {
        host,
        port,
        username,
        password: Some(password),
        ..Default::default()
    })
}

/// Remote root to walk in live tests (`SFTP_ROOT`, default: "/")
pub fn live_root() -> String {
    dotenvy::dotenv().ok();
    std::env::var("SFTP_ROOT").unwrap_or_else(|_| "/".to_string())
}

/// Whether live credentials are available
pub fn has_live_credentials() -> bool {
    load_remote_config().is_ok()
}
