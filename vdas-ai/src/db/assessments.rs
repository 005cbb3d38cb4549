//! Assessment record persistence
//!
//! Records are keyed by job id and carry a hard expiry (`expires_at`). Expired
//! records are invisible to reads and deleted by the retention sweeper.
//!
//! The state-machine gates live here as conditional updates, so two callers
//! racing on the same job cannot both win:
//! - [`AssessmentStore::try_start`]: `pending` → `in_progress`, new run token
//! - [`AssessmentStore::finish_run`]: final write of the run holding the token
//! - [`AssessmentStore::mark_timed_out`]: `in_progress` → `failed`

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use vdas_common::time::{parse_db_timestamp, to_db_timestamp};
use vdas_common::{Error, Result};

use crate::models::{AssessmentJob, AssessmentResults, AssessmentStatus, AssessmentUpdate};
use crate::utils::retry_on_lock;

/// Error stored on jobs failed by the read-path timeout
pub const TIMED_OUT_ERROR: &str = "Assessment timed out";

const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Assessment state store backed by SQLite
#[derive(Debug, Clone)]
pub struct AssessmentStore {
    pool: SqlitePool,
    retention: Duration,
    max_lock_wait_ms: u64,
}

/// Update values prepared for binding
struct UpdateColumns {
    status: Option<&'static str>,
    started_at: Option<String>,
    updated_at: Option<String>,
    completed_at: Option<String>,
    results: Option<String>,
    summary: Option<String>,
    error: Option<String>,
}

impl UpdateColumns {
    fn prepare(update: &AssessmentUpdate) -> Result<Self> {
        let results = update
            .results
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to serialize results: {}", e)))?;

        Ok(Self {
            status: update.status.map(|s| s.as_str()),
            started_at: update.started_at.map(to_db_timestamp),
            updated_at: update.updated_at.map(to_db_timestamp),
            completed_at: update.completed_at.map(to_db_timestamp),
            results,
            summary: update.summary.clone(),
            error: update.error.clone(),
        })
    }
}

impl AssessmentStore {
    pub fn new(pool: SqlitePool, retention: Duration) -> Self {
        Self {
            pool,
            retention,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Load a record, `None` when absent or expired
    pub async fn get(&self, id: &str) -> Result<Option<AssessmentJob>> {
        self.get_at(id, Utc::now()).await
    }

    /// Load a record as seen at `now`
    pub async fn get_at(&self, id: &str, now: DateTime<Utc>) -> Result<Option<AssessmentJob>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, created_at, started_at, updated_at, completed_at,
                   results, summary, error, run_token, expires_at
            FROM assessments
            WHERE id = ? AND expires_at > ?
            "#,
        )
        .bind(id)
        .bind(to_db_timestamp(now))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    /// Merge `update` into the record, creating it when absent
    ///
    /// A new record defaults to `pending`, `created_at` now, and expires one
    /// retention period after creation. Later writes change only the provided
    /// fields and never move `created_at` or the expiry.
    pub async fn set(&self, id: &str, update: &AssessmentUpdate) -> Result<()> {
        let columns = UpdateColumns::prepare(update)?;
        let created_at = update.created_at.unwrap_or_else(Utc::now);
        let created_str = to_db_timestamp(created_at);
        let expires_str = to_db_timestamp(created_at + self.retention);

        retry_on_lock("assessment set", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO assessments (
                    id, status, created_at, started_at, updated_at, completed_at,
                    results, summary, error, expires_at
                ) VALUES (?1, COALESCE(?2, 'pending'), ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO UPDATE SET
                    status = COALESCE(?2, status),
                    started_at = COALESCE(?4, started_at),
                    updated_at = COALESCE(?5, updated_at),
                    completed_at = COALESCE(?6, completed_at),
                    results = COALESCE(?7, results),
                    summary = COALESCE(?8, summary),
                    error = COALESCE(?9, error)
                "#,
            )
            .bind(id)
            .bind(columns.status)
            .bind(&created_str)
            .bind(&columns.started_at)
            .bind(&columns.updated_at)
            .bind(&columns.completed_at)
            .bind(&columns.results)
            .bind(&columns.summary)
            .bind(&columns.error)
            .bind(&expires_str)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }

    /// Start gate: `pending` → `in_progress`
    ///
    /// Returns the new run token, or `None` when the job is absent, expired or
    /// not pending. At most one of any number of concurrent callers wins.
    pub async fn try_start(&self, id: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        let now_str = to_db_timestamp(now);

        retry_on_lock("assessment start", self.max_lock_wait_ms, || async {
            let token: Option<i64> = sqlx::query_scalar(
                r#"
                UPDATE assessments
                SET status = 'in_progress',
                    started_at = ?1,
                    updated_at = ?1,
                    run_token = run_token + 1
                WHERE id = ?2 AND status = 'pending' AND expires_at > ?1
                RETURNING run_token
                "#,
            )
            .bind(&now_str)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(token)
        })
        .await
    }

    /// Final write of a run
    ///
    /// Applied only while the job is still `in_progress` under `run_token`;
    /// returns `false` when the run lost the job (timed out or superseded).
    pub async fn finish_run(&self, id: &str, run_token: i64, update: &AssessmentUpdate) -> Result<bool> {
        let columns = UpdateColumns::prepare(update)?;

        let rows = retry_on_lock("assessment finish", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                r#"
                UPDATE assessments
                SET status = COALESCE(?1, status),
                    updated_at = COALESCE(?2, updated_at),
                    completed_at = COALESCE(?3, completed_at),
                    results = COALESCE(?4, results),
                    summary = COALESCE(?5, summary),
                    error = COALESCE(?6, error)
                WHERE id = ?7 AND status = 'in_progress' AND run_token = ?8
                "#,
            )
            .bind(columns.status)
            .bind(&columns.updated_at)
            .bind(&columns.completed_at)
            .bind(&columns.results)
            .bind(&columns.summary)
            .bind(&columns.error)
            .bind(id)
            .bind(run_token)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected())
        })
        .await?;

        Ok(rows > 0)
    }

    /// Fail a stuck `in_progress` job; `false` when it was no longer in progress
    pub async fn mark_timed_out(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let now_str = to_db_timestamp(now);

        let rows = retry_on_lock("assessment timeout", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                r#"
                UPDATE assessments
                SET status = 'failed', error = ?1, updated_at = ?2
                WHERE id = ?3 AND status = 'in_progress'
                "#,
            )
            .bind(TIMED_OUT_ERROR)
            .bind(&now_str)
            .bind(id)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected())
        })
        .await?;

        Ok(rows > 0)
    }

    /// Delete every record expired at `now`, returning their ids
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let now_str = to_db_timestamp(now);

        retry_on_lock("assessment purge", self.max_lock_wait_ms, || async {
            let ids: Vec<String> =
                sqlx::query_scalar("DELETE FROM assessments WHERE expires_at <= ? RETURNING id")
                    .bind(&now_str)
                    .fetch_all(&self.pool)
                    .await?;
            Ok(ids)
        })
        .await
    }
}

fn parse_optional_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.try_get(column)?;
    value.as_deref().map(parse_db_timestamp).transpose()
}

fn job_from_row(row: &SqliteRow) -> Result<AssessmentJob> {
    let status: String = row.try_get("status")?;
    let status: AssessmentStatus = status.parse().map_err(Error::Internal)?;

    let results: Option<String> = row.try_get("results")?;
    let results = results
        .as_deref()
        .map(serde_json::from_str::<AssessmentResults>)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize results: {}", e)))?;

    let created_at: String = row.try_get("created_at")?;
    let expires_at: String = row.try_get("expires_at")?;

    Ok(AssessmentJob {
        id: row.try_get("id")?,
        status,
        created_at: parse_db_timestamp(&created_at)?,
        started_at: parse_optional_timestamp(row, "started_at")?,
        updated_at: parse_optional_timestamp(row, "updated_at")?,
        completed_at: parse_optional_timestamp(row, "completed_at")?,
        results,
        summary: row.try_get("summary")?,
        error: row.try_get("error")?,
        run_token: row.try_get("run_token")?,
        expires_at: parse_db_timestamp(&expires_at)?,
    })
}
