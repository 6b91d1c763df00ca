//! Authentication route handlers.
//!
//! Sessions are cookie based; a successful login rotates the session id and
//! stores a [`CurrentUser`] snapshot under `current_user`.

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use la_artesa_core::ClientProfileId;

use super::ApiJson;
use crate::db::client_profiles;
use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::middleware::{ClientIp, RequireAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::response::ApiResponse;
use crate::services::AuthService;
use crate::services::auth::Registration;
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub recaptcha_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// The logged-in user plus onboarding state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub client_profile_id: Option<ClientProfileId>,
    pub client_approved: bool,
}

// =============================================================================
// Handlers
// =============================================================================

async fn start_session(session: &Session, user: &User) -> Result<(), AppError> {
    set_current_user(session, &CurrentUser::from(user)).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}

/// Create a client account and log it in.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    ip: ClientIp,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<ApiResponse<User>, AppError> {
    let remote_ip = ip.to_string_opt();
    state
        .recaptcha()
        .verify(body.recaptcha_token.as_deref(), remote_ip.as_deref())
        .await?;

    let user = AuthService::new(state.pool())
        .register(Registration {
            email: &body.email,
            password: &body.password,
            first_name: body.first_name.trim(),
            last_name: body.last_name.trim(),
        })
        .await?;

    start_session(&session, &user).await?;
    Ok(ApiResponse::created(user).with_message("Account created"))
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<ApiResponse<User>, AppError> {
    let user = AuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await?;

    start_session(&session, &user).await?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(ApiResponse::ok(user))
}

pub async fn logout(session: Session) -> Result<ApiResponse<()>, AppError> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(ApiResponse::message("Logged out"))
}

pub async fn me(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<ApiResponse<MeResponse>, AppError> {
    let user = AuthService::new(state.pool())
        .current_user(current.id)
        .await?;
    let profile = client_profiles::get_by_user(state.pool(), user.id).await?;

    Ok(ApiResponse::ok(MeResponse {
        client_profile_id: profile.as_ref().map(|p| p.id),
        client_approved: profile.is_some_and(|p| p.is_approved),
        user,
    }))
}

pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> Result<ApiResponse<()>, AppError> {
    AuthService::new(state.pool())
        .change_password(current.id, &body.current_password, &body.new_password)
        .await?;
    Ok(ApiResponse::message("Password updated"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_names_optional() {
        let body: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@b.co","password":"pan12345","recaptchaToken":"tok"}"#,
        )
        .unwrap();
        assert_eq!(body.first_name, "");
        assert_eq!(body.recaptcha_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_change_password_request_is_camel_case() {
        let body: ChangePasswordRequest = serde_json::from_str(
            r#"{"currentPassword":"viejo123","newPassword":"nuevo123"}"#,
        )
        .unwrap();
        assert_eq!(body.current_password, "viejo123");
        assert_eq!(body.new_password, "nuevo123");
    }
}
