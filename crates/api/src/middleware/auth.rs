//! Authentication extractors.
//!
//! The session holds a [`CurrentUser`] snapshot taken at login. Each
//! authenticated request re-reads the account so deactivation and role
//! changes take effect immediately; a session whose account is gone or
//! disabled is flushed.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tower_sessions::Session;

use crate::db::users::UserRepository;
use crate::error::AppError;
use crate::models::{CurrentUser, session_keys};
use crate::state::AppState;

fn not_logged_in() -> AppError {
    AppError::Unauthorized("Authentication required".to_owned())
}

/// Extractor that requires a logged-in, active user.
///
/// Rejects with `401 UNAUTHORIZED` JSON.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Get the session from extensions (set by SessionManagerLayer)
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(not_logged_in)?;

        let snapshot: CurrentUser = session
            .get(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten()
            .ok_or_else(not_logged_in)?;

        let state = AppState::from_ref(state);
        let user = UserRepository::new(state.pool())
            .get_by_id(snapshot.id)
            .await?;

        match user {
            Some(user) if user.is_active => Ok(Self(CurrentUser::from(&user))),
            _ => {
                tracing::info!(user_id = %snapshot.id, "Dropping session of missing or disabled account");
                if let Err(e) = session.flush().await {
                    tracing::warn!(error = %e, "Failed to flush stale session");
                }
                Err(not_logged_in())
            }
        }
    }
}

/// Extractor that requires a logged-in admin.
///
/// Rejects with `401` when not logged in and `403 FORBIDDEN` for clients.
pub struct RequireAdmin(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        require_admin(user).map(Self)
    }
}

/// Accept only admins.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for non-admin users.
pub fn require_admin(user: CurrentUser) -> Result<CurrentUser, AppError> {
    if user.is_admin() {
        Ok(user)
    } else {
        Err(AppError::Forbidden("Administrator access required".to_owned()))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is logged in.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = RequireAuth::from_request_parts(parts, state)
            .await
            .ok()
            .map(|RequireAuth(user)| user);
        Ok(Self(user))
    }
}

/// Store the logged-in user, rotating the session id first.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// End the session (logout).
///
/// # Errors
///
/// Returns an error if the session store cannot be updated.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;
    use la_artesa_core::{Email, UserId, UserRole};

    use super::*;

    fn user(role: UserRole) -> CurrentUser {
        CurrentUser {
            id: UserId::new(1),
            email: Email::parse("ana@laartesa.co").unwrap(),
            role,
        }
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(user(UserRole::Admin)).is_ok());

        let err = require_admin(user(UserRole::Client)).unwrap_err();
        let (status, code, _) = err.parts();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(code, "FORBIDDEN");
    }

    #[test]
    fn test_not_logged_in_is_401() {
        let (status, code, _) = not_logged_in().parts();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(code, "UNAUTHORIZED");
    }
}
