//! SAP sync run history.

use chrono::{DateTime, Utc};
use serde::Serialize;

use la_artesa_core::{SyncKind, SyncRunId, SyncStatus};

/// One execution of a SAP import.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub id: SyncRunId,
    pub kind: SyncKind,
    pub status: SyncStatus,
    pub created_count: i32,
    pub updated_count: i32,
    pub skipped_count: i32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
