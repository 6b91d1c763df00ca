//! SAP sync run bookkeeping.
//!
//! A partial unique index allows a single `running` row per kind, so
//! [`start`] doubles as the concurrency guard.

use sqlx::PgPool;

use la_artesa_core::{SyncKind, SyncRunId, SyncStatus};

use super::RepositoryError;
use crate::models::SyncRun;

const RUN_COLUMNS: &str = "id, kind, status, created_count, updated_count, skipped_count, \
                           error, started_at, finished_at";

/// Counters accumulated while a sync runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncCounts {
    pub created: i32,
    pub updated: i32,
    pub skipped: i32,
}

/// Open a `running` row for `kind`.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if a run of the same kind is in progress.
pub async fn start(pool: &PgPool, kind: SyncKind) -> Result<SyncRun, RepositoryError> {
    sqlx::query_as::<_, SyncRun>(&format!(
        "INSERT INTO sap_sync_runs (kind) VALUES ($1) RETURNING {RUN_COLUMNS}"
    ))
    .bind(kind)
    .fetch_one(pool)
    .await
    .map_err(|e| RepositoryError::from_unique(e, "running sync"))
}

/// Close a run with its final status and counters.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the run does not exist.
pub async fn finish(
    pool: &PgPool,
    id: SyncRunId,
    status: SyncStatus,
    counts: SyncCounts,
    error: Option<&str>,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE sap_sync_runs SET
            status = $2,
            created_count = $3,
            updated_count = $4,
            skipped_count = $5,
            error = $6,
            finished_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(status)
    .bind(counts.created)
    .bind(counts.updated)
    .bind(counts.skipped)
    .bind(error)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Mark runs left `running` by a crashed process as failed.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn fail_stale(pool: &PgPool) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE sap_sync_runs SET status = 'failed', error = 'interrupted', finished_at = NOW()
        WHERE status = 'running'
        ",
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Most recent runs, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<SyncRun>, RepositoryError> {
    let runs = sqlx::query_as::<_, SyncRun>(&format!(
        "SELECT {RUN_COLUMNS} FROM sap_sync_runs ORDER BY started_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(runs)
}
