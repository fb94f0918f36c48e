//! # sftp-ingest
//!
//! Unattended batch ingestion of files from an SFTP server.
//!
//! One run walks the configured remote roots, selects files by keyword and
//! extension, fetches and validates them with a bounded pool of workers, and
//! records exactly one outcome per file in a SQLite database and an
//! append-only delimited log.
//!
//! ## Design
//!
//! - **Per-file isolation** - transport failures, validator errors and panics
//!   become an outcome for that file; siblings keep running
//! - **Explicit retry policy** - transient remote errors are retried with
//!   backoff, permanent ones (missing file, access denied) are not
//! - **No silent loss** - a result that cannot be persisted aborts the run
//! - **Library-first** - no CLI and no logging subscriber; the host process
//!   loads configuration and installs `tracing` output
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sftp_ingest::{Config, CsvValidator, Ingestor, RemoteConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         remote: RemoteConfig {
//!             host: "sftp.example.com".to_string(),
//!             username: "ingest".to_string(),
//!             password: Some("secret".to_string()),
//!             ..Default::default()
//!         },
//!         roots: vec!["/outgoing/reports".to_string()],
//!         ..Default::default()
//!     };
//!
//!     let ingestor = Ingestor::new(config, Arc::new(CsvValidator::new())).await?;
//!     let report = ingestor.run_until_signal().await?;
//!     println!("{}", report.summary.render());
//!
//!     ingestor.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Results database
pub mod db;
/// Error types
pub mod error;
/// Remote path selection
pub mod filter;
/// Batch orchestration
pub mod ingestor;
/// Recursive remote discovery
pub mod lister;
/// Post-run notifications
pub mod notify;
/// Fetch-validate-record worker pool
pub mod pipeline;
/// Remote transport
pub mod remote;
/// Retry logic with backoff
pub mod retry;
/// Outcome persistence
pub mod sink;
/// Core types
pub mod types;
/// Content validation
pub mod validator;

// Re-export commonly used types
pub use config::{
    Backoff, Config, FilterConfig, LocalConfig, NotificationConfig, PipelineConfig, RemoteConfig,
    RetryConfig, WebhookConfig,
};
pub use db::Database;
pub use error::{Error, Result, StorageError, ValidationFailure};
pub use filter::PathFilter;
pub use ingestor::Ingestor;
pub use lister::{Lister, Listing};
pub use notify::{Notifier, TracingNotifier, WebhookNotifier};
pub use pipeline::Pipeline;
pub use remote::{FaultKind, MemoryRemote, RemoteEntry, RemoteSession, SftpSession};
pub use retry::{IsRetryable, RetryExecutor};
pub use sink::{ResultSink, ValidationLog};
pub use types::{
    BatchReport, CandidateFile, PersistedRecord, RemotePath, RunSummary, SkippedDirectory,
    ValidationOutcome, ValidationState, Verdict,
};
pub use validator::{CsvValidator, Validator};

/// Wait for a termination request
///
/// - **Unix:** SIGTERM or SIGINT, falling back to whichever handler could be registered.
/// - **Windows/other:** Ctrl+C via `tokio::signal::ctrl_c()`.
#[cfg(unix)]
pub(crate) async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
