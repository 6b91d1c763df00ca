//! Password reset route handlers.
//!
//! `request` answers the same way whether or not the address belongs to an
//! account, so the endpoint cannot be used to enumerate users.

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiJson, ApiPath};
use crate::error::AppError;
use crate::middleware::ClientIp;
use crate::response::ApiResponse;
use crate::services::PasswordResetService;
use crate::state::AppState;

const REQUEST_ACCEPTED: &str =
    "If the address belongs to an account, a reset link has been sent to it";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    pub email: String,
    pub recaptcha_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    pub valid: bool,
    pub expires_at: DateTime<Utc>,
}

fn service(state: &AppState) -> PasswordResetService<'_> {
    PasswordResetService::new(
        state.pool(),
        state.email(),
        state.recaptcha(),
        &state.config().frontend_url,
    )
}

/// Mail a reset link to the address, if it has an active account.
pub async fn request(
    State(state): State<AppState>,
    ip: ClientIp,
    ApiJson(body): ApiJson<ResetRequest>,
) -> Result<ApiResponse<()>, AppError> {
    let remote_ip = ip.to_string_opt();
    service(&state)
        .request_reset(
            &body.email,
            body.recaptcha_token.as_deref(),
            remote_ip.as_deref(),
        )
        .await?;
    Ok(ApiResponse::message(REQUEST_ACCEPTED))
}

/// Check a token before showing the new-password form.
pub async fn validate(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
) -> Result<ApiResponse<TokenStatus>, AppError> {
    let expires_at = service(&state).validate_token(&token).await?;
    Ok(ApiResponse::ok(TokenStatus {
        valid: true,
        expires_at,
    }))
}

/// Redeem a token and set the new password.
pub async fn reset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResetPasswordRequest>,
) -> Result<ApiResponse<()>, AppError> {
    service(&state)
        .reset_password(&body.token, &body.new_password)
        .await?;
    Ok(ApiResponse::message("Password has been reset"))
}
