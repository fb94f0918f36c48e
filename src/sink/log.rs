//! Append-only delimited validation log.
//!
//! One header line, then one line per recorded outcome with the fields
//! `File, Validation State, Errors, Warnings, Info`. `File` is the full remote
//! path, so same-named files from different directories stay distinct. Issue
//! lists are written as JSON arrays inside a quoted field.

use crate::error::StorageError;
use crate::types::ValidationOutcome;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Column names of the validation log
pub const LOG_HEADER: [&str; 5] = ["File", "Validation State", "Errors", "Warnings", "Info"];

fn log_error(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Storage(StorageError::LogWriteFailed(format!("{}: {}", context, e)))
}

/// Encode one record as a single delimited line (terminator included)
fn encode_line<I, S>(fields: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(fields)
        .map_err(|e| log_error("failed to encode log line", e))?;
    writer
        .into_inner()
        .map_err(|e| log_error("failed to encode log line", e))
}

/// Encode an outcome the way it appears in the validation log
pub fn encode_outcome(outcome: &ValidationOutcome) -> Result<Vec<u8>> {
    let errors = serde_json::to_string(&outcome.errors)?;
    let warnings = serde_json::to_string(&outcome.warnings)?;
    let info = serde_json::to_string(&outcome.info)?;
    encode_line([
        outcome.path.as_str(),
        outcome.state.as_str(),
        errors.as_str(),
        warnings.as_str(),
        info.as_str(),
    ])
}

/// Writer for the validation log
///
/// Not synchronized; the owning [`ResultSink`](super::ResultSink) serializes access.
#[derive(Debug)]
pub struct ValidationLog {
    path: PathBuf,
    file: File,
}

impl ValidationLog {
    /// Open (or create) the log for appending
    ///
    /// The header is written only when the file is new or empty.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| log_error("failed to create log directory", e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| log_error("failed to open validation log", e))?;

        let len = file
            .metadata()
            .await
            .map_err(|e| log_error("failed to stat validation log", e))?
            .len();

        if len == 0 {
            let header = encode_line(LOG_HEADER)?;
            file.write_all(&header)
                .await
                .map_err(|e| log_error("failed to write log header", e))?;
            file.flush()
                .await
                .map_err(|e| log_error("failed to write log header", e))?;
            tracing::debug!(path = %path.display(), "Created validation log");
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length of the log in bytes
    pub async fn byte_len(&self) -> Result<u64> {
        Ok(self
            .file
            .metadata()
            .await
            .map_err(|e| log_error("failed to stat validation log", e))?
            .len())
    }

    /// Append one outcome line
    ///
    /// Returns the length of the file before the append, to hand back to
    /// [`truncate`](Self::truncate) if the surrounding record is abandoned.
    pub async fn append(&mut self, outcome: &ValidationOutcome) -> Result<u64> {
        let line = encode_outcome(outcome)?;
        let mark = self.byte_len().await?;

        let written = match self.file.write_all(&line).await {
            Ok(()) => self.file.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            // A torn line would break every later reader
            if let Err(trunc) = self.file.set_len(mark).await {
                tracing::error!(
                    path = %self.path.display(),
                    error = %trunc,
                    "Failed to remove partial validation log line"
                );
            }
            return Err(log_error("failed to append to validation log", e));
        }

        Ok(mark)
    }

    /// Cut the log back to `len` bytes
    pub async fn truncate(&mut self, len: u64) -> Result<()> {
        self.file
            .set_len(len)
            .await
            .map_err(|e| log_error("failed to roll back validation log", e))
    }
}
