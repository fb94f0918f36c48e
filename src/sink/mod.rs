//! Single writer for the results database and the validation log.
//!
//! Every [`ResultSink::record`] call holds the sink lock for its full
//! duration, so concurrent workers never interleave rows or log lines.
//! A record is one database transaction with the log line appended before
//! commit; a failed commit truncates the log back, so a retried record is
//! written exactly once to both.

use crate::config::LocalConfig;
use crate::db::Database;
use crate::error::StorageError;
use crate::types::{PersistedRecord, ValidationOutcome};
use crate::{Error, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

mod log;

pub use log::{LOG_HEADER, ValidationLog, encode_outcome};

/// Pause between record attempts
const RECORD_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Thread-safe outcome aggregator
pub struct ResultSink {
    db: Database,
    log: Mutex<ValidationLog>,
    log_path: PathBuf,
    attempts: u32,
}

impl ResultSink {
    /// Build a sink over an open database and log
    pub fn new(db: Database, log: ValidationLog, attempts: u32) -> Self {
        let log_path = log.path().to_path_buf();
        Self {
            db,
            log: Mutex::new(log),
            log_path,
            attempts: attempts.max(1),
        }
    }

    /// Open the database and log named in the local configuration
    pub async fn open(local: &LocalConfig, attempts: u32) -> Result<Self> {
        let db = Database::new(&local.database_path).await?;
        let log = ValidationLog::open(&local.log_file).await?;
        tracing::info!(
            database = %local.database_path.display(),
            log = %local.log_file.display(),
            "Result sink ready"
        );
        Ok(Self::new(db, log, attempts))
    }

    /// Persist one outcome to the database and the log
    ///
    /// Retries the pair as a unit; returns [`StorageError::RecordFailed`] once
    /// every attempt has failed.
    pub async fn record(&self, outcome: &ValidationOutcome) -> Result<PersistedRecord> {
        let mut log = self.log.lock().await;
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            match self.try_record(&mut log, outcome).await {
                Ok(record) => {
                    tracing::debug!(
                        id = record.id,
                        file = %outcome.filename,
                        state = %outcome.state,
                        "Recorded outcome"
                    );
                    return Ok(record);
                }
                Err(e) => {
                    tracing::warn!(
                        file = %outcome.filename,
                        attempt,
                        max_attempts = self.attempts,
                        error = %e,
                        "Failed to record outcome"
                    );
                    last_error = Some(e);
                    if attempt < self.attempts {
                        tokio::time::sleep(RECORD_RETRY_DELAY * attempt).await;
                    }
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        tracing::error!(
            file = %outcome.filename,
            attempts = self.attempts,
            reason = %reason,
            "Giving up on recording outcome"
        );
        Err(Error::Storage(StorageError::RecordFailed {
            filename: outcome.filename.clone(),
            attempts: self.attempts,
            reason,
        }))
    }

    async fn try_record(
        &self,
        log: &mut ValidationLog,
        outcome: &ValidationOutcome,
    ) -> Result<PersistedRecord> {
        let timestamp = Utc::now();

        let mut tx = self.db.pool().begin().await.map_err(Error::Sqlx)?;
        let id = Database::insert_result_with(&mut *tx, outcome, timestamp).await?;

        // Dropping `tx` on an append failure rolls the row back
        let mark = log.append(outcome).await?;

        if let Err(e) = tx.commit().await {
            if let Err(trunc) = log.truncate(mark).await {
                tracing::error!(
                    file = %outcome.filename,
                    error = %trunc,
                    "Validation log may contain a line with no stored result"
                );
            }
            return Err(Error::Sqlx(e));
        }

        Ok(PersistedRecord {
            id,
            timestamp,
            outcome: outcome.clone(),
        })
    }

    /// Results database, for queries
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Path of the validation log
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Close the database pool
    pub async fn close(&self) {
        self.db.close().await;
    }
}
