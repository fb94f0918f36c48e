//! Database layer for sftp-ingest
//!
//! Append-only SQLite store of validation outcomes.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`results`] - Inserting and querying validation results

use crate::error::{Error, Result};
use crate::types::{PersistedRecord, RemotePath, ValidationOutcome, ValidationState};
use chrono::{TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod results;

/// Result record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct ResultRow {
    /// Unique database ID
    pub id: i64,
    /// Remote file name
    pub filename: String,
    /// Full remote path
    pub path: String,
    /// "valid", "invalid" or "error"
    pub state: String,
    /// JSON array of error strings
    pub errors: String,
    /// JSON array of warning strings
    pub warnings: String,
    /// JSON array of info strings
    pub info: String,
    /// Unix timestamp (milliseconds) when the record was written
    pub timestamp: i64,
}

impl TryFrom<ResultRow> for PersistedRecord {
    type Error = Error;

    fn try_from(row: ResultRow) -> Result<Self> {
        let state = ValidationState::parse(&row.state).ok_or_else(|| {
            Error::Other(format!(
                "unknown validation state '{}' in result {}",
                row.state, row.id
            ))
        })?;

        let timestamp = Utc
            .timestamp_millis_opt(row.timestamp)
            .single()
            .ok_or_else(|| {
                Error::Other(format!(
                    "timestamp {} out of range in result {}",
                    row.timestamp, row.id
                ))
            })?;

        Ok(PersistedRecord {
            id: row.id,
            timestamp,
            outcome: ValidationOutcome {
                filename: row.filename,
                path: RemotePath::new(row.path),
                state,
                errors: serde_json::from_str(&row.errors)?,
                warnings: serde_json::from_str(&row.warnings)?,
                info: serde_json::from_str(&row.info)?,
            },
        })
    }
}

/// Number of stored results per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    /// Results in state `valid`
    pub valid: i64,
    /// Results in state `invalid`
    pub invalid: i64,
    /// Results in state `error`
    pub error: i64,
}

impl StateCounts {
    /// Sum over all states
    pub fn total(&self) -> i64 {
        self.valid + self.invalid + self.error
    }
}

/// Database handle for sftp-ingest
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
