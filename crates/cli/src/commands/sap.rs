//! One-shot SAP synchronization.
//!
//! ```bash
//! artesa-cli sap sync products
//! artesa-cli sap sync clients
//! ```
//!
//! Runs in the foreground and records a `sap_sync_runs` row like the API
//! trigger does, so a sync started here also blocks one from the admin UI.

use la_artesa_api::config::SapConfig;
use la_artesa_api::services::SapClient;
use la_artesa_api::services::sap::{SyncReport, run_sync};
use la_artesa_core::SyncKind;

use super::{CliError, connect};

/// Run a sync of the given kind to completion.
///
/// # Errors
///
/// Returns `CliError::SapNotConfigured` without SAP settings and
/// `CliError::Sap` if another run of the same kind is in progress.
pub async fn sync(kind: SyncKind) -> Result<SyncReport, CliError> {
    let config = SapConfig::from_env()?.ok_or(CliError::SapNotConfigured)?;
    let pool = connect().await?;
    let client = SapClient::new(&config)?;

    tracing::info!("Starting SAP {kind} sync against {}", config.service_url);
    let report = run_sync(&pool, &client, kind).await?;

    tracing::info!(
        "SAP {} sync {}: {} created, {} updated, {} skipped",
        report.kind,
        report.status,
        report.created,
        report.updated,
        report.skipped
    );
    if let Some(error) = &report.error {
        tracing::error!("Sync error: {error}");
    }
    Ok(report)
}
