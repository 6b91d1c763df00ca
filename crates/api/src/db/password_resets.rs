//! Password reset token storage.
//!
//! Only the SHA-256 hash of each token is stored. Lookups match the hash
//! exactly and require the row to be unused and unexpired.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use la_artesa_core::{PasswordResetId, UserId};

use super::RepositoryError;

/// A reset token row that is still redeemable.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActiveReset {
    pub id: PasswordResetId,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Store a new token hash for a user.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert(
    conn: &mut PgConnection,
    user_id: UserId,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<PasswordResetId, RepositoryError> {
    let id = sqlx::query_scalar::<_, PasswordResetId>(
        r"
        INSERT INTO password_resets (user_id, token_hash, expires_at)
        VALUES ($1, $2, $3)
        RETURNING id
        ",
    )
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .fetch_one(conn)
    .await?;

    Ok(id)
}

/// Mark every unused token of a user as used.
///
/// Returns the number of tokens invalidated.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn invalidate_for_user(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        "UPDATE password_resets SET used = TRUE, used_at = NOW() WHERE user_id = $1 AND NOT used",
    )
    .bind(user_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Find a redeemable token by hash.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn find_active(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<ActiveReset>, RepositoryError> {
    let row = sqlx::query_as::<_, ActiveReset>(
        r"
        SELECT id, user_id, expires_at
        FROM password_resets
        WHERE token_hash = $1 AND NOT used AND expires_at > NOW()
        ",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Find and lock a redeemable token inside a transaction.
///
/// Concurrent redemptions of the same token serialize on the row lock; the
/// second one sees `used = TRUE` and gets `None`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_active(
    conn: &mut PgConnection,
    token_hash: &str,
) -> Result<Option<ActiveReset>, RepositoryError> {
    let row = sqlx::query_as::<_, ActiveReset>(
        r"
        SELECT id, user_id, expires_at
        FROM password_resets
        WHERE token_hash = $1 AND NOT used AND expires_at > NOW()
        FOR UPDATE
        ",
    )
    .bind(token_hash)
    .fetch_optional(conn)
    .await?;

    Ok(row)
}

/// Mark a token as used.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the token was already used.
pub async fn mark_used(conn: &mut PgConnection, id: PasswordResetId) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE password_resets SET used = TRUE, used_at = NOW() WHERE id = $1 AND NOT used",
    )
    .bind(id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Delete tokens that expired or were used before `cutoff`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the delete fails.
pub async fn purge_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        "DELETE FROM password_resets WHERE expires_at < $1 OR (used AND used_at < $1)",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
