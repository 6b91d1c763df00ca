//! Administration route handlers: settings and user management.

use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;

use la_artesa_core::{UserId, UserRole};

use super::{ApiJson, ApiPath, ApiQuery};
use crate::db::{self, settings, users::UserRepository};
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{CurrentUser, SettingKey, Settings, User};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SettingRequest {
    pub value: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersQuery {
    pub page: Option<u32>,
    #[serde(alias = "per_page")]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

/// Admins cannot lock themselves out.
fn check_not_self(admin: &CurrentUser, target: UserId, action: &str) -> Result<(), AppError> {
    if admin.id == target {
        return Err(AppError::BadRequest(format!("you cannot {action} your own account")));
    }
    Ok(())
}

// =============================================================================
// Settings
// =============================================================================

pub async fn settings(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<ApiResponse<Settings>, AppError> {
    Ok(ApiResponse::ok(settings::load(state.pool()).await?))
}

/// Validate and store one setting, returning the effective settings.
pub async fn update_setting(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(key): ApiPath<String>,
    ApiJson(body): ApiJson<SettingRequest>,
) -> Result<ApiResponse<Settings>, AppError> {
    let key: SettingKey = key.parse().map_err(|_| AppError::UnknownSetting(key))?;
    let value = key
        .normalize(&body.value)
        .map_err(|msg| AppError::BadRequest(format!("{}: {msg}", key.as_str())))?;

    settings::set(state.pool(), key, &value).await?;
    tracing::info!(key = key.as_str(), admin_id = %admin.id, "Setting changed");

    Ok(ApiResponse::ok(settings::load(state.pool()).await?))
}

// =============================================================================
// Users
// =============================================================================

pub async fn users(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiQuery(query): ApiQuery<UsersQuery>,
) -> Result<ApiResponse<Vec<User>>, AppError> {
    let (limit, offset) = db::page_bounds(query.page, query.per_page);
    let users = UserRepository::new(state.pool()).list(limit, offset).await?;
    Ok(ApiResponse::ok(users))
}

pub async fn set_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(body): ApiJson<RoleRequest>,
) -> Result<ApiResponse<User>, AppError> {
    if body.role != UserRole::Admin {
        check_not_self(&admin, id, "demote")?;
    }
    let user = UserRepository::new(state.pool())
        .set_role(id, body.role)
        .await?;
    tracing::info!(user_id = %id, role = %body.role, admin_id = %admin.id, "User role changed");
    Ok(ApiResponse::ok(user))
}

pub async fn set_active(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(body): ApiJson<ActiveRequest>,
) -> Result<ApiResponse<User>, AppError> {
    if !body.active {
        check_not_self(&admin, id, "deactivate")?;
    }
    let user = UserRepository::new(state.pool())
        .set_active(id, body.active)
        .await?;
    tracing::info!(user_id = %id, active = body.active, admin_id = %admin.id, "User activation changed");
    Ok(ApiResponse::ok(user))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use la_artesa_core::Email;

    use super::*;

    fn admin(id: i32) -> CurrentUser {
        CurrentUser {
            id: UserId::new(id),
            email: Email::parse("admin@laartesa.co").unwrap(),
            role: UserRole::Admin,
        }
    }

    #[test]
    fn test_check_not_self() {
        assert!(check_not_self(&admin(1), UserId::new(2), "demote").is_ok());
        let err = check_not_self(&admin(1), UserId::new(1), "demote").unwrap_err();
        assert_eq!(err.to_string(), "Bad request: you cannot demote your own account");
    }

    #[test]
    fn test_role_request_is_snake_case() {
        let body: RoleRequest = serde_json::from_str(r#"{"role":"admin"}"#).unwrap();
        assert_eq!(body.role, UserRole::Admin);
        assert!(serde_json::from_str::<RoleRequest>(r#"{"role":"owner"}"#).is_err());
    }
}
