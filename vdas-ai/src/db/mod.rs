//! Database access for vdas-ai
//!
//! One SQLite database in the root folder holds the assessment records.

pub mod assessments;

pub use assessments::AssessmentStore;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use vdas_common::Result;

/// Open (creating if needed) the database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&db_url)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the assessment tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessments (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            started_at TEXT,
            updated_at TEXT,
            completed_at TEXT,
            results TEXT,
            summary TEXT,
            error TEXT,
            run_token INTEGER NOT NULL DEFAULT 0,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_assessments_expires_at ON assessments(expires_at)")
        .execute(pool)
        .await?;

    Ok(())
}
