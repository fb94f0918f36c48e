//! Batch orchestration: connect, list, run, close, summarize, notify.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::filter::PathFilter;
use crate::lister::Lister;
use crate::notify::{self, Notifier};
use crate::pipeline::Pipeline;
use crate::remote::{RemoteSession, SftpSession};
use crate::retry::RetryExecutor;
use crate::sink::ResultSink;
use crate::types::{BatchReport, RunSummary};
use crate::validator::Validator;

/// Runs one batch to completion against the configured server
///
/// An `Ingestor` owns the result sink for its lifetime. Its cancellation token
/// is single-shot: once cancelled, later runs stop before dispatching any file.
pub struct Ingestor {
    config: Config,
    validator: Arc<dyn Validator>,
    sink: Arc<ResultSink>,
    notifiers: Vec<Arc<dyn Notifier>>,
    notify_deadline: Duration,
    cancel: CancellationToken,
}

impl Ingestor {
    /// Validate the configuration and open the results database and log
    ///
    /// Malformed configuration is rejected here, before anything touches the
    /// network or the filesystem.
    pub async fn new(config: Config, validator: Arc<dyn Validator>) -> Result<Self> {
        config.validate()?;

        let sink = ResultSink::open(&config.local, config.pipeline.record_attempts).await?;
        let notifiers = notify::from_config(&config.notifications.webhooks);
        let notify_deadline = notify::delivery_deadline(&config.notifications.webhooks);

        Ok(Self {
            config,
            validator,
            sink: Arc::new(sink),
            notifiers,
            notify_deadline,
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the notifiers built from the configuration
    pub fn with_notifiers(mut self, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        self.notifiers = notifiers;
        self
    }

    /// Token that stops dispatching new files when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Sink holding the results database and validation log
    pub fn sink(&self) -> &Arc<ResultSink> {
        &self.sink
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connect over SFTP and run one batch
    ///
    /// A connection failure is returned immediately; nothing is recorded.
    pub async fn run(&self) -> Result<BatchReport> {
        let session = SftpSession::connect(&self.config.remote).await?;
        self.run_with_session(Arc::new(session)).await
    }

    /// Run one batch over an already open session
    ///
    /// The session is closed before this returns, whether the run succeeded,
    /// was cancelled, or aborted on a storage failure. On success the report
    /// is handed to the notifiers and this waits for delivery, bounded by the
    /// configured webhook timeouts.
    pub async fn run_with_session(&self, session: Arc<dyn RemoteSession>) -> Result<BatchReport> {
        let started_at = Utc::now();
        let result = self.execute(Arc::clone(&session), started_at).await;

        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "Failed to close remote session");
        }

        let report = result?;
        tracing::info!(
            total = report.summary.total,
            valid = report.summary.valid,
            invalid = report.summary.invalid,
            error = report.summary.error,
            skipped_directories = report.summary.skipped_directories,
            cancelled = report.summary.cancelled,
            log = %report.log_path.display(),
            "Batch run complete"
        );

        let delivery = notify::dispatch(self.notifiers.clone(), report.clone());
        notify::wait_for_delivery(delivery, self.notify_deadline).await;
        Ok(report)
    }

    /// Run with SFTP, cancelling on SIGINT/SIGTERM (Ctrl+C elsewhere)
    ///
    /// Files in flight when the signal arrives are finished and recorded; the
    /// partial report is returned.
    pub async fn run_until_signal(&self) -> Result<BatchReport> {
        let cancel = self.cancel.clone();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                _ = crate::wait_for_signal() => {
                    tracing::warn!("Shutdown requested, finishing in-flight files");
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        });

        let result = self.run().await;
        watcher.abort();
        result
    }

    /// Close the results database
    pub async fn shutdown(self) {
        self.sink.close().await;
    }

    async fn execute(
        &self,
        session: Arc<dyn RemoteSession>,
        started_at: DateTime<Utc>,
    ) -> Result<BatchReport> {
        let retry = RetryExecutor::new(self.config.pipeline.retry.clone());

        let lister = Lister::new(
            Arc::clone(&session),
            PathFilter::from_config(&self.config.filter),
            retry.clone(),
        );
        let listing = lister.list(&self.config.roots, &self.cancel).await;

        let pipeline = Pipeline::new(
            session,
            Arc::clone(&self.validator),
            Arc::clone(&self.sink),
            retry,
        )
        .with_staging_dir(self.config.local.staging_dir.clone())
        .with_delete_after_fetch(self.config.pipeline.delete_after_fetch)
        .with_cancellation(self.cancel.clone());

        let outcomes = pipeline
            .run(listing.candidates, self.config.pipeline.concurrency)
            .await?;

        let summary = RunSummary {
            skipped_directories: listing.skipped.len(),
            cancelled: self.cancel.is_cancelled(),
            ..RunSummary::from_outcomes(&outcomes)
        };

        Ok(BatchReport {
            outcomes,
            skipped: listing.skipped,
            summary,
            log_path: self.sink.log_path().to_path_buf(),
            started_at,
            finished_at: Utc::now(),
        })
    }
}
