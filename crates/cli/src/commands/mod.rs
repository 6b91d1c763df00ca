//! CLI subcommand implementations.

pub mod migrate;
pub mod reset_tokens;
pub mod sap;
pub mod users;

use sqlx::PgPool;
use thiserror::Error;

use la_artesa_api::config::{ConfigError, DatabaseConfig};
use la_artesa_api::db;

/// Errors shared by all commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    Repository(#[from] db::RepositoryError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] la_artesa_core::EmailError),

    #[error("{0}")]
    Auth(#[from] la_artesa_api::services::AuthError),

    #[error("{0}")]
    PasswordReset(#[from] la_artesa_api::services::PasswordResetError),

    #[error("SAP error: {0}")]
    Sap(#[from] la_artesa_api::services::SapError),

    #[error("No user with email {0}")]
    UserNotFound(String),

    #[error("SAP integration is not configured (set SAP_SERVICE_URL, SAP_COMPANY_DB, SAP_USERNAME, SAP_PASSWORD)")]
    SapNotConfigured,
}

/// Connect using the same database settings as the API.
///
/// # Errors
///
/// Returns `CliError::Config` for incomplete settings and
/// `CliError::Database` if the connection fails.
pub async fn connect() -> Result<PgPool, CliError> {
    let options = DatabaseConfig::from_env()?.connect_options()?;
    tracing::info!("Connecting to database...");
    Ok(db::create_pool(options).await?)
}
