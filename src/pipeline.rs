//! Bounded worker pool that fetches, validates and records candidate files.
//!
//! The candidate set is closed when [`Pipeline::run`] starts. A fixed number
//! of workers pull from a shared queue; each file is processed in its own task
//! so a panic in transport or validator code only affects that file. Every
//! dequeued file produces exactly one outcome, which is persisted through the
//! [`ResultSink`] before the worker takes the next file. With removal enabled,
//! the remote file is deleted only after a non-error outcome for it is stored.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::remote::RemoteSession;
use crate::retry::RetryExecutor;
use crate::sink::ResultSink;
use crate::types::{CandidateFile, RemotePath, ValidationOutcome, ValidationState};
use crate::validator::Validator;

/// Shared, read-only state used while processing one file
struct FileContext {
    session: Arc<dyn RemoteSession>,
    validator: Arc<dyn Validator>,
    retry: RetryExecutor,
    staging_dir: Option<PathBuf>,
    delete_after_fetch: bool,
}

/// Fetch-validate-record worker pool
pub struct Pipeline {
    session: Arc<dyn RemoteSession>,
    validator: Arc<dyn Validator>,
    sink: Arc<ResultSink>,
    retry: RetryExecutor,
    staging_dir: Option<PathBuf>,
    delete_after_fetch: bool,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Build a pipeline over an open session and sink
    pub fn new(
        session: Arc<dyn RemoteSession>,
        validator: Arc<dyn Validator>,
        sink: Arc<ResultSink>,
        retry: RetryExecutor,
    ) -> Self {
        Self {
            session,
            validator,
            sink,
            retry,
            staging_dir: None,
            delete_after_fetch: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Also write each retrieved file to `<dir>/<filename>` before validating it
    pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.staging_dir = dir;
        self
    }

    /// Remove each remote file once its valid or invalid outcome is recorded
    pub fn with_delete_after_fetch(mut self, enabled: bool) -> Self {
        self.delete_after_fetch = enabled;
        self
    }

    /// Stop dispatching new files when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process every candidate with at most `concurrency` files in flight
    ///
    /// Returns one outcome per processed file, in completion order. After
    /// cancellation the files already in flight finish and are recorded; the
    /// rest are left unprocessed and the partial list is returned. A failure to
    /// persist an outcome stops all workers and is returned as an error.
    pub async fn run(
        &self,
        candidates: Vec<CandidateFile>,
        concurrency: usize,
    ) -> Result<Vec<ValidationOutcome>> {
        let total = candidates.len();
        if total == 0 {
            tracing::info!("No candidate files to process");
            return Ok(Vec::new());
        }

        let workers = concurrency.clamp(1, total);
        tracing::info!(files = total, workers, "Starting pipeline");

        let queue = Arc::new(Mutex::new(VecDeque::from(candidates)));
        let ctx = Arc::new(FileContext {
            session: Arc::clone(&self.session),
            validator: Arc::clone(&self.validator),
            retry: self.retry.clone(),
            staging_dir: self.staging_dir.clone(),
            delete_after_fetch: self.delete_after_fetch,
        });
        // Fires on a storage failure; separate from the caller's token so an
        // abort is never mistaken for an operator cancel
        let halt = CancellationToken::new();

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let worker = Worker {
                id: worker_id,
                queue: Arc::clone(&queue),
                ctx: Arc::clone(&ctx),
                sink: Arc::clone(&self.sink),
                cancel: self.cancel.clone(),
                halt: halt.clone(),
            };
            set.spawn(worker.run());
        }

        let mut outcomes = Vec::with_capacity(total);
        let mut failure: Option<Error> = None;

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(mut batch)) => outcomes.append(&mut batch),
                Ok(Err(e)) => {
                    halt.cancel();
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    halt.cancel();
                    tracing::error!(error = %e, "Pipeline worker terminated unexpectedly");
                    failure.get_or_insert(Error::Other(format!("pipeline worker failed: {}", e)));
                }
            }
        }

        if let Some(e) = failure {
            tracing::error!(
                error = %e,
                recorded = outcomes.len(),
                "Pipeline aborted"
            );
            return Err(e);
        }

        let remaining = queue.lock().await.len();
        if remaining > 0 {
            tracing::warn!(
                processed = outcomes.len(),
                remaining,
                "Pipeline cancelled before all files were processed"
            );
        } else {
            tracing::info!(processed = outcomes.len(), "Pipeline finished");
        }

        Ok(outcomes)
    }
}

struct Worker {
    id: usize,
    queue: Arc<Mutex<VecDeque<CandidateFile>>>,
    ctx: Arc<FileContext>,
    sink: Arc<ResultSink>,
    cancel: CancellationToken,
    halt: CancellationToken,
}

impl Worker {
    async fn run(self) -> Result<Vec<ValidationOutcome>> {
        let mut outcomes = Vec::new();

        loop {
            if self.cancel.is_cancelled() || self.halt.is_cancelled() {
                break;
            }
            let Some(candidate) = self.queue.lock().await.pop_front() else {
                break;
            };

            let path = candidate.path;
            let task = tokio::spawn(process_file(Arc::clone(&self.ctx), path.clone()));
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = panic_message(e);
                    tracing::error!(
                        worker = self.id,
                        path = %path,
                        reason = %reason,
                        "File processing panicked"
                    );
                    ValidationOutcome::transport_error(
                        &path,
                        format!("processing failed unexpectedly: {}", reason),
                    )
                }
            };

            match outcome.state {
                ValidationState::Valid => {
                    tracing::debug!(worker = self.id, path = %path, "File is valid")
                }
                ValidationState::Invalid => tracing::info!(
                    worker = self.id,
                    path = %path,
                    errors = outcome.errors.len(),
                    "File is invalid"
                ),
                ValidationState::Error => tracing::warn!(
                    worker = self.id,
                    path = %path,
                    error = outcome.errors.first().map(String::as_str).unwrap_or_default(),
                    "File could not be processed"
                ),
            }

            self.sink.record(&outcome).await?;

            if self.ctx.delete_after_fetch && outcome.state != ValidationState::Error {
                let removal = tokio::spawn(remove_remote(Arc::clone(&self.ctx), path.clone()));
                if let Err(e) = removal.await {
                    tracing::warn!(
                        worker = self.id,
                        path = %path,
                        reason = %panic_message(e),
                        "Remote file removal panicked; file left in place"
                    );
                }
            }

            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

/// Fetch, stage and validate one file. Never fails: every problem becomes
/// part of the returned outcome.
async fn process_file(ctx: Arc<FileContext>, path: RemotePath) -> ValidationOutcome {
    let content = match ctx.retry.execute(|| ctx.session.fetch(&path)).await {
        Ok(content) => content,
        Err(e) => return ValidationOutcome::transport_error(&path, e.to_string()),
    };

    if let Some(dir) = &ctx.staging_dir
        && let Err(e) = stage(dir, &path, &content).await
    {
        return ValidationOutcome::transport_error(
            &path,
            format!("failed to stage file locally: {}", e),
        );
    }

    let validator = Arc::clone(&ctx.validator);
    match tokio::task::spawn_blocking(move || validator.validate(&content)).await {
        Ok(Ok(verdict)) => ValidationOutcome::from_verdict(&path, verdict),
        Ok(Err(failure)) => ValidationOutcome::validator_failure(
            &path,
            format!("validation failed: {}", failure),
        ),
        Err(e) => ValidationOutcome::validator_failure(
            &path,
            format!("validator panicked: {}", panic_message(e)),
        ),
    }
}

/// Delete a recorded file from the server. Failures leave the file in place
/// and never change the stored outcome.
async fn remove_remote(ctx: Arc<FileContext>, path: RemotePath) {
    match ctx.retry.execute(|| ctx.session.remove(&path)).await {
        Ok(()) => tracing::debug!(path = %path, "Removed remote file"),
        Err(e) => tracing::warn!(
            path = %path,
            error = %e,
            "Failed to remove remote file; it will be fetched again next run"
        ),
    }
}

/// Write `content` to `<dir>/<filename>`
///
/// The file is written under a unique temporary name and renamed into place,
/// so concurrent writers of the same name never leave mixed content.
async fn stage(dir: &Path, path: &RemotePath, content: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let name = path.file_name();
    let target = dir.join(name);
    let partial = dir.join(format!(".{}.{:016x}.part", name, rand::random::<u64>()));

    if let Err(e) = tokio::fs::write(&partial, content).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&partial, &target).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }

    tracing::debug!(path = %path, staged = %target.display(), "Staged file");
    Ok(())
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            }
        }
        Err(e) => e.to_string(),
    }
}
