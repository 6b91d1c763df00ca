//! Settings database operations.

use serde_json::Value as JsonValue;
use sqlx::PgPool;

use super::RepositoryError;
use crate::models::{SettingKey, Settings};

/// Load all stored settings and merge them over the defaults.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn load(pool: &PgPool) -> Result<Settings, RepositoryError> {
    let rows: Vec<(String, JsonValue)> = sqlx::query_as("SELECT key, value FROM settings")
        .fetch_all(pool)
        .await?;

    Ok(Settings::from_pairs(rows))
}

/// Set a setting value. The value must already be normalized for its key.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn set(pool: &PgPool, key: SettingKey, value: &JsonValue) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO settings (key, value)
        VALUES ($1, $2)
        ON CONFLICT (key) DO UPDATE SET value = $2, updated_at = NOW()
        ",
    )
    .bind(key.as_str())
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}
