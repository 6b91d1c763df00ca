//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] la_artesa_core::EmailError),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The account exists but was deactivated by an admin.
    #[error("account disabled")]
    AccountDisabled,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// Another account already uses the email.
    #[error("email already registered")]
    EmailTaken,

    /// Password too weak or invalid.
    #[error("{0}")]
    WeakPassword(String),

    /// A required field is missing or empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
