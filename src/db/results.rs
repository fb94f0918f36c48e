//! Validation result persistence and queries.

use crate::types::{PersistedRecord, ValidationOutcome, ValidationState};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::{Database, ResultRow, StateCounts};

impl Database {
    /// Append one outcome using an existing connection or transaction
    ///
    /// Returns the store-assigned id. Issue lists are stored as JSON arrays.
    pub async fn insert_result_with(
        conn: &mut SqliteConnection,
        outcome: &ValidationOutcome,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO results (filename, path, state, errors, warnings, info, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&outcome.filename)
        .bind(outcome.path.as_str())
        .bind(outcome.state.as_str())
        .bind(serde_json::to_string(&outcome.errors)?)
        .bind(serde_json::to_string(&outcome.warnings)?)
        .bind(serde_json::to_string(&outcome.info)?)
        .bind(timestamp.timestamp_millis())
        .execute(&mut *conn)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.last_insert_rowid())
    }

    /// Append one outcome in its own implicit transaction
    #[cfg(test)]
    pub(crate) async fn insert_result(&self, outcome: &ValidationOutcome) -> Result<PersistedRecord> {
        let mut conn = self.pool.acquire().await.map_err(Error::Sqlx)?;
        let timestamp = Utc::now();
        let id = Self::insert_result_with(&mut conn, outcome, timestamp).await?;
        Ok(PersistedRecord {
            id,
            timestamp,
            outcome: outcome.clone(),
        })
    }

    /// Get a single result by id
    pub async fn get_result(&self, id: i64) -> Result<Option<PersistedRecord>> {
        let row = sqlx::query_as::<_, ResultRow>(
            r#"
            SELECT id, filename, path, state, errors, warnings, info, timestamp
            FROM results
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        row.map(PersistedRecord::try_from).transpose()
    }

    /// Query results with pagination and optional state filter
    ///
    /// Returns results newest first.
    pub async fn list_results(
        &self,
        state_filter: Option<ValidationState>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PersistedRecord>> {
        let query = if let Some(state) = state_filter {
            sqlx::query_as::<_, ResultRow>(
                r#"
                SELECT id, filename, path, state, errors, warnings, info, timestamp
                FROM results
                WHERE state = ?
                ORDER BY id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(state.as_str())
            .bind(limit as i64)
            .bind(offset as i64)
        } else {
            sqlx::query_as::<_, ResultRow>(
                r#"
                SELECT id, filename, path, state, errors, warnings, info, timestamp
                FROM results
                ORDER BY id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(limit as i64)
            .bind(offset as i64)
        };

        let rows = query.fetch_all(&self.pool).await.map_err(Error::Sqlx)?;

        rows.into_iter().map(PersistedRecord::try_from).collect()
    }

    /// Count stored results per state
    pub async fn count_by_state(&self) -> Result<StateCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM results GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Sqlx)?;

        let mut counts = StateCounts::default();
        for (state, count) in rows {
            match ValidationState::parse(&state) {
                Some(ValidationState::Valid) => counts.valid = count,
                Some(ValidationState::Invalid) => counts.invalid = count,
                Some(ValidationState::Error) => counts.error = count,
                None => tracing::warn!(state = %state, "Ignoring unknown result state"),
            }
        }
        Ok(counts)
    }

    /// Count results recorded for a file name
    #[cfg(test)]
    pub(crate) async fn count_results_for(&self, filename: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM results WHERE filename = ?")
            .bind(filename)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)
    }
}
