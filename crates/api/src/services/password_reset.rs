//! Password reset flow.
//!
//! A request issues a random single-use token, stores its SHA-256 hash with
//! a one hour expiry and mails the plain token inside a link. Redeeming the
//! token sets a new password and burns the token in the same transaction.
//! Issuing a token invalidates every older unused token of the user.

use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use la_artesa_core::{Email, EmailError as AddressError, UserId};

use super::auth::{self, AuthError};
use super::email::{EmailError, EmailService};
use super::recaptcha::{RecaptchaError, RecaptchaVerifier};
use crate::db::users::{self, UserRepository};
use crate::db::{RepositoryError, password_resets};

/// Random bytes per token; hex encoding doubles the length.
pub const TOKEN_BYTES: usize = 32;

/// Length of an encoded token.
pub const TOKEN_LENGTH: usize = TOKEN_BYTES * 2;

/// How long a token stays redeemable.
pub const TOKEN_TTL: TimeDelta = TimeDelta::hours(1);

/// Used or expired tokens older than this are purged.
pub const RETENTION: TimeDelta = TimeDelta::days(7);

/// Errors from the password reset flow.
#[derive(Debug, Error)]
pub enum PasswordResetError {
    #[error(transparent)]
    Recaptcha(#[from] RecaptchaError),

    #[error("invalid email: {0}")]
    InvalidEmail(#[from] AddressError),

    /// Unknown, expired, used or malformed token.
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("{0}")]
    WeakPassword(String),

    #[error("failed to send email: {0}")]
    Email(#[from] EmailError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("password hashing error")]
    PasswordHash,
}

impl From<sqlx::Error> for PasswordResetError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

impl From<AuthError> for PasswordResetError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::WeakPassword(msg) => Self::WeakPassword(msg),
            AuthError::Repository(e) => Self::Repository(e),
            _ => Self::PasswordHash,
        }
    }
}

/// Generate a token: 32 bytes from an OS-seeded CSPRNG, lowercase hex.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 of a token, lowercase hex. This is what the database stores.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Canonicalize a token from a URL or form, rejecting anything that could
/// not have been issued.
#[must_use]
pub fn normalize_token(token: &str) -> Option<String> {
    let token = token.trim();
    (token.len() == TOKEN_LENGTH && token.bytes().all(|b| b.is_ascii_hexdigit()))
        .then(|| token.to_ascii_lowercase())
}

/// Expiry of a token issued at `issued_at`.
#[must_use]
pub fn expires_at(issued_at: DateTime<Utc>) -> DateTime<Utc> {
    issued_at + TOKEN_TTL
}

/// Frontend page that redeems a token.
#[must_use]
pub fn reset_link(frontend_url: &str, token: &str) -> String {
    format!("{}/reset-password/{token}", frontend_url.trim_end_matches('/'))
}

/// Password reset service.
pub struct PasswordResetService<'a> {
    pool: &'a PgPool,
    email: &'a EmailService,
    recaptcha: &'a RecaptchaVerifier,
    frontend_url: &'a str,
}

impl<'a> PasswordResetService<'a> {
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        email: &'a EmailService,
        recaptcha: &'a RecaptchaVerifier,
        frontend_url: &'a str,
    ) -> Self {
        Self {
            pool,
            email,
            recaptcha,
            frontend_url,
        }
    }

    /// Issue a token and mail the reset link.
    ///
    /// Succeeds silently for unknown or inactive accounts.
    ///
    /// # Errors
    ///
    /// Returns `PasswordResetError::Recaptcha` if the bot check fails,
    /// `PasswordResetError::InvalidEmail` for a malformed address and
    /// `PasswordResetError::Email` if the link could not be sent.
    #[instrument(skip(self, recaptcha_token, remote_ip))]
    pub async fn request_reset(
        &self,
        email: &str,
        recaptcha_token: Option<&str>,
        remote_ip: Option<&str>,
    ) -> Result<(), PasswordResetError> {
        self.recaptcha.verify(recaptcha_token, remote_ip).await?;

        let email = Email::parse(email)?;
        let Some(user) = UserRepository::new(self.pool)
            .get_by_email(&email)
            .await?
            .filter(|u| u.is_active)
        else {
            tracing::info!("Password reset requested for unknown or inactive account");
            return Ok(());
        };

        let token = generate_token();
        let issued_at = Utc::now();

        let mut tx = self.pool.begin().await?;
        let invalidated = password_resets::invalidate_for_user(&mut *tx, user.id).await?;
        password_resets::insert(&mut *tx, user.id, &hash_token(&token), expires_at(issued_at))
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, invalidated, "Password reset token issued");

        self.email
            .send_password_reset(
                user.email.as_str(),
                &user.display_name(),
                &reset_link(self.frontend_url, &token),
                TOKEN_TTL.num_minutes(),
            )
            .await?;

        Ok(())
    }

    /// Check that a token can still be redeemed.
    ///
    /// # Errors
    ///
    /// Returns `PasswordResetError::InvalidToken` for malformed, unknown,
    /// used or expired tokens.
    pub async fn validate_token(&self, token: &str) -> Result<DateTime<Utc>, PasswordResetError> {
        let token = normalize_token(token).ok_or(PasswordResetError::InvalidToken)?;
        let active = password_resets::find_active(self.pool, &hash_token(&token))
            .await?
            .ok_or(PasswordResetError::InvalidToken)?;
        Ok(active.expires_at)
    }

    /// Redeem a token and set a new password.
    ///
    /// # Errors
    ///
    /// Returns `PasswordResetError::WeakPassword` if the password is rejected
    /// and `PasswordResetError::InvalidToken` if the token cannot be redeemed,
    /// including when a concurrent reset with the same token won.
    #[instrument(skip_all)]
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), PasswordResetError> {
        let token = normalize_token(token).ok_or(PasswordResetError::InvalidToken)?;
        auth::validate_password(new_password)?;
        let password_hash = auth::hash_password(new_password)?;

        let mut tx = self.pool.begin().await?;
        let reset = password_resets::lock_active(&mut *tx, &hash_token(&token))
            .await?
            .ok_or(PasswordResetError::InvalidToken)?;

        users::set_password(&mut *tx, reset.user_id, &password_hash).await?;
        password_resets::mark_used(&mut *tx, reset.id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => PasswordResetError::InvalidToken,
                other => PasswordResetError::Repository(other),
            })?;
        tx.commit().await?;

        tracing::info!(user_id = %reset.user_id, "Password reset completed");

        self.notify_changed(reset.user_id).await;
        Ok(())
    }

    async fn notify_changed(&self, user_id: UserId) {
        let user = match UserRepository::new(self.pool).get_by_id(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, %user_id, "Could not load user for password notice");
                return;
            }
        };

        let changed_at = Utc::now().format("%Y-%m-%d %H:%M UTC").to_string();
        if let Err(e) = self
            .email
            .send_password_changed(
                user.email.as_str(),
                &user.display_name(),
                &changed_at,
                self.frontend_url.trim_end_matches('/'),
            )
            .await
        {
            tracing::warn!(error = %e, %user_id, "Failed to send password changed notice");
        }
    }
}

/// Delete tokens that expired or were used before the retention window.
///
/// # Errors
///
/// Returns `PasswordResetError::Repository` if the delete fails.
pub async fn purge_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, PasswordResetError> {
    let purged = password_resets::purge_before(pool, now - RETENTION).await?;
    tracing::info!(purged, "Purged stale password reset tokens");
    Ok(purged)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_generated_token_is_64_lowercase_hex() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens: std::collections::HashSet<String> = (0..64).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 64);
    }

    #[test]
    fn test_hash_is_deterministic_and_differs_from_token() {
        let token = generate_token();
        let hash = hash_token(&token);
        assert_eq!(hash, hash_token(&token));
        assert_ne!(hash, token);
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_hash_known_vector() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_normalize_token() {
        let token = generate_token();
        assert_eq!(normalize_token(&token), Some(token.clone()));
        assert_eq!(
            normalize_token(&format!(" {} ", token.to_uppercase())),
            Some(token.clone())
        );
        assert_eq!(normalize_token(&token[..63]), None);
        assert_eq!(normalize_token(&format!("{token}0")), None);
        assert_eq!(normalize_token(&"g".repeat(64)), None);
        assert_eq!(normalize_token(""), None);
        assert_eq!(normalize_token("../../etc/passwd"), None);
    }

    #[test]
    fn test_expiry_is_one_hour_after_issue() {
        let issued = Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2026, 3, 2, 0, 30, 0).unwrap();
        assert_eq!(expires_at(issued), expected);
    }

    #[test]
    fn test_reset_link() {
        assert_eq!(
            reset_link("https://laartesa.co/", "ab12"),
            "https://laartesa.co/reset-password/ab12"
        );
        assert_eq!(
            reset_link("http://localhost:3000", "ab12"),
            "http://localhost:3000/reset-password/ab12"
        );
    }

    #[test]
    fn test_weak_password_maps_through() {
        let err: PasswordResetError = auth::validate_password("short").unwrap_err().into();
        assert!(matches!(err, PasswordResetError::WeakPassword(_)));
    }
}
