//! Password reset token maintenance.
//!
//! ```bash
//! artesa-cli reset-tokens purge
//! ```
//!
//! Intended for a daily cron job; tokens expire on their own after an hour,
//! this only keeps the table small.

use chrono::Utc;

use la_artesa_api::services::password_reset;

use super::{CliError, connect};

/// Delete tokens that expired or were used more than a week ago.
///
/// # Errors
///
/// Returns an error if the database is unreachable or the delete fails.
pub async fn purge() -> Result<u64, CliError> {
    let pool = connect().await?;
    let purged = password_reset::purge_expired(&pool, Utc::now()).await?;
    tracing::info!("Purged {purged} password reset tokens");
    Ok(purged)
}
