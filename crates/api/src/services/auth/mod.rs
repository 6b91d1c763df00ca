//! Authentication service.
//!
//! Password accounts with argon2id hashes. Sessions are handled by the
//! route layer; this service only decides who the caller is.

mod error;

pub use error::AuthError;

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;
use tracing::instrument;

use la_artesa_core::{Email, UserId, UserRole};

use crate::db::RepositoryError;
use crate::db::users::{NewUser, UserRepository};
use crate::models::User;

/// Minimum password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length, in characters.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash verified when the email is unknown, so a miss costs the same
/// argon2 work as a wrong password.
static UNKNOWN_ACCOUNT_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("unknown-account-placeholder").unwrap_or_default());

/// Input for a new account.
#[derive(Debug)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    /// Register a new client account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::EmailTaken` if the email is already registered.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: Registration<'_>) -> Result<User, AuthError> {
        let email = Email::parse(input.email)?;
        let first_name = input.first_name.trim();
        let last_name = input.last_name.trim();
        if first_name.is_empty() {
            return Err(AuthError::MissingField("first name"));
        }
        if last_name.is_empty() {
            return Err(AuthError::MissingField("last name"));
        }

        validate_password(input.password)?;
        let password_hash = hash_password(input.password)?;

        let user = self
            .users
            .create(NewUser {
                email: &email,
                password_hash: &password_hash,
                first_name,
                last_name,
                role: UserRole::Client,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::EmailTaken,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "Client account registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// Unknown emails and wrong passwords produce the same error.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    /// Returns `AuthError::AccountDisabled` if the account was deactivated.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let Some(row) = self.users.get_with_password(&email).await? else {
            let _ = verify_password(password, &UNKNOWN_ACCOUNT_HASH);
            return Err(AuthError::InvalidCredentials);
        };

        verify_password(password, &row.password_hash)?;

        if !row.user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        Ok(row.user)
    }

    /// Load an active user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user is missing or inactive.
    pub async fn current_user(&self, id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::UserNotFound)
    }

    /// Change a password after checking the current one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the current password is wrong.
    /// Returns `AuthError::WeakPassword` if the new password is rejected.
    #[instrument(skip(self, current, new))]
    pub async fn change_password(
        &self,
        id: UserId,
        current: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        let stored = self.users.get_password_hash(id).await.map_err(|e| match e {
            RepositoryError::NotFound => AuthError::UserNotFound,
            other => AuthError::Repository(other),
        })?;

        verify_password(current, &stored)?;
        validate_password(new)?;

        let hash = hash_password(new)?;
        self.users.update_password(id, &hash).await?;

        tracing::info!(user_id = %id, "Password changed");
        Ok(())
    }
}

/// Validate password meets requirements.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` with a user-facing message.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    if !password.chars().any(char::is_alphabetic) || !password.chars().any(|c| c.is_ascii_digit())
    {
        return Err(AuthError::WeakPassword(
            "password must contain at least one letter and one number".to_owned(),
        ));
    }

    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` on mismatch or a malformed hash.
pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_account_hash_is_a_real_argon2_hash() {
        assert!(UNKNOWN_ACCOUNT_HASH.starts_with("$argon2id$"));
        assert!(PasswordHash::new(&UNKNOWN_ACCOUNT_HASH).is_ok());
        assert!(matches!(
            verify_password("unknown-account-placeholder-x", &UNKNOWN_ACCOUNT_HASH),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_validate_password_accepts_letters_and_digits() {
        assert!(validate_password("masamadre1").is_ok());
        assert!(validate_password("Ñandú2024").is_ok());
    }

    #[test]
    fn test_validate_password_rejects_short() {
        let err = validate_password("abc123").unwrap_err();
        assert!(err.to_string().contains("at least 8"));
    }

    #[test]
    fn test_validate_password_rejects_long() {
        let long = format!("a1{}", "x".repeat(MAX_PASSWORD_LENGTH));
        assert!(validate_password(&long).is_err());
    }

    #[test]
    fn test_validate_password_requires_letter_and_digit() {
        assert!(validate_password("12345678").is_err());
        assert!(validate_password("abcdefgh").is_err());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("croissant42").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("croissant42", &hash).is_ok());
        assert!(matches!(
            verify_password("croissant43", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("croissant42").unwrap();
        let b = hash_password("croissant42").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(matches!(
            verify_password("anything1", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }
}
