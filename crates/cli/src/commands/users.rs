//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create the first admin (password from ARTESA_USER_PASSWORD or --password)
//! artesa-cli user create -e admin@laartesa.co -f Ana -l Rojas --admin
//!
//! # Give an existing account the admin role
//! artesa-cli user promote -e compras@laartesa.co
//! ```

use secrecy::{ExposeSecret, SecretString};

use la_artesa_api::db::users::{NewUser, UserRepository};
use la_artesa_api::models::User;
use la_artesa_api::services::auth::{hash_password, validate_password};
use la_artesa_core::{Email, UserRole};

use super::{CliError, connect};

/// Input for `user create`.
pub struct NewAccount<'a> {
    pub email: &'a str,
    pub password: SecretString,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub admin: bool,
}

/// Create a user with a hashed password.
///
/// # Errors
///
/// Returns an error for an invalid email, a weak password, or an email that
/// is already registered.
pub async fn create(account: NewAccount<'_>) -> Result<User, CliError> {
    let email = Email::parse(account.email)?;
    validate_password(account.password.expose_secret())?;
    let password_hash = hash_password(account.password.expose_secret())?;
    let role = if account.admin {
        UserRole::Admin
    } else {
        UserRole::Client
    };

    let pool = connect().await?;
    tracing::info!("Creating user: {email} ({role})");

    let user = UserRepository::new(&pool)
        .create(NewUser {
            email: &email,
            password_hash: &password_hash,
            first_name: account.first_name.trim(),
            last_name: account.last_name.trim(),
            role,
        })
        .await?;

    tracing::info!("User created successfully! ID: {}, Email: {}", user.id, user.email);
    Ok(user)
}

/// Give an existing user the admin role.
///
/// # Errors
///
/// Returns `CliError::UserNotFound` if no account has that email.
pub async fn promote(email: &str) -> Result<User, CliError> {
    let email = Email::parse(email)?;
    let pool = connect().await?;
    let users = UserRepository::new(&pool);

    let user = users
        .get_by_email(&email)
        .await?
        .ok_or_else(|| CliError::UserNotFound(email.to_string()))?;

    if user.role == UserRole::Admin {
        tracing::info!("{email} is already an admin");
        return Ok(user);
    }

    let user = users.set_role(user.id, UserRole::Admin).await?;
    tracing::info!("{email} is now an admin");
    Ok(user)
}
