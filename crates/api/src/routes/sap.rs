//! SAP synchronization route handlers (admin).
//!
//! Syncs run in the background; the trigger answers `202 Accepted` with the
//! run row so the frontend can poll `/api/sap/sync/runs`.

use axum::extract::State;

use la_artesa_core::SyncKind;

use crate::db::sap_sync;
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::SyncRun;
use crate::response::ApiResponse;
use crate::services::sap::spawn_sync;
use crate::state::AppState;

/// How many runs the history endpoint returns.
const RECENT_RUNS: i64 = 20;

async fn trigger(state: &AppState, kind: SyncKind) -> Result<ApiResponse<SyncRun>, AppError> {
    let client = state.sap().ok_or(AppError::SapNotConfigured)?.clone();
    let run = spawn_sync(state.pool().clone(), client, kind).await?;
    Ok(ApiResponse::accepted(run).with_message("Sync started"))
}

pub async fn sync_products(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<ApiResponse<SyncRun>, AppError> {
    tracing::info!(admin_id = %admin.id, "Product sync requested");
    trigger(&state, SyncKind::Products).await
}

pub async fn sync_clients(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<ApiResponse<SyncRun>, AppError> {
    tracing::info!(admin_id = %admin.id, "Client sync requested");
    trigger(&state, SyncKind::Clients).await
}

pub async fn runs(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<ApiResponse<Vec<SyncRun>>, AppError> {
    Ok(ApiResponse::ok(
        sap_sync::recent(state.pool(), RECENT_RUNS).await?,
    ))
}
