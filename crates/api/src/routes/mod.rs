//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                  - Liveness
//! GET  /health/ready                            - Readiness (database)
//!
//! # Auth (strict rate limit)
//! POST /api/auth/register                       - Create account (reCAPTCHA)
//! POST /api/auth/login                          - Start session
//! POST /api/auth/logout                         - End session
//! GET  /api/auth/me                             - Current user
//! PUT  /api/auth/password                       - Change password
//!
//! # Password reset (strict rate limit)
//! POST /api/password-reset/request              - Mail a reset link (reCAPTCHA)
//! GET  /api/password-reset/validate/{token}     - Check a token
//! POST /api/password-reset/reset                - Set a new password
//!
//! # Catalog
//! GET    /api/products                          - List
//! GET    /api/products/{id}                     - Detail with images
//! POST   /api/products                          - Create (admin)
//! PUT    /api/products/{id}                     - Update (admin)
//! DELETE /api/products/{id}                     - Deactivate (admin)
//! POST   /api/products/{id}/images              - Add image (admin)
//! DELETE /api/products/{id}/images/{image_id}   - Remove image (admin)
//! PUT    /api/products/{id}/images/{image_id}/primary - Set primary (admin)
//!
//! # Client profiles
//! POST   /api/client-profiles                   - Create own profile
//! GET    /api/client-profiles/me                - Own profile
//! PUT    /api/client-profiles/me                - Edit own profile
//! GET    /api/client-profiles                   - List (admin)
//! GET    /api/client-profiles/{id}              - Detail (admin)
//! PUT    /api/client-profiles/{id}/approval     - Approve (admin)
//! DELETE /api/client-profiles/{id}              - Delete (admin)
//! POST   /api/client-profiles/{id}/documents    - Upload (owner/admin)
//! GET    /api/client-profiles/{id}/documents    - List (owner/admin)
//! GET    /api/client-profiles/{id}/documents/{doc_id} - Download (owner/admin)
//!
//! # Orders and payments
//! POST /api/orders                              - Place
//! GET  /api/orders                              - List
//! GET  /api/orders/{id}                         - Detail
//! PUT  /api/orders/{id}/status                  - Change status (admin)
//! POST /api/orders/{id}/cancel                  - Cancel own pending order
//! POST /api/payments                            - Record
//! GET  /api/payments?orderId=                   - List for an order
//! PUT  /api/payments/{id}/review                - Approve/reject (admin)
//!
//! # Administration
//! GET  /api/admin/settings                      - Effective settings
//! PUT  /api/admin/settings/{key}                - Change one setting
//! GET  /api/admin/users                         - List users
//! PUT  /api/admin/users/{id}/role               - Change role
//! PUT  /api/admin/users/{id}/active             - Enable/disable
//!
//! # SAP (admin)
//! POST /api/sap/sync/products                   - Start product import
//! POST /api/sap/sync/clients                    - Start client terms import
//! GET  /api/sap/sync/runs                       - Latest runs
//! ```

pub mod admin;
pub mod auth;
pub mod client_profiles;
pub mod health;
pub mod orders;
pub mod password_reset;
pub mod payments;
pub mod products;
pub mod sap;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts},
    routing::{delete, get, post, put},
};

use crate::error::AppError;
use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::services::documents::MAX_DOCUMENT_BYTES;
use crate::state::AppState;

/// Multipart framing on top of the largest accepted document.
const UPLOAD_BODY_LIMIT: usize = MAX_DOCUMENT_BYTES + 64 * 1024;

// =============================================================================
// Extractors with JSON rejections
// =============================================================================

/// `axum::Json` with `AppError` rejections.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` with `AppError` rejections.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// `axum::extract::Path` with `AppError` rejections.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Trim an optional string, dropping it when empty.
pub(crate) fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Trim a required string.
///
/// # Errors
///
/// Returns `AppError::BadRequest` naming the field when it is blank.
pub(crate) fn required(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_owned())
}

// =============================================================================
// Routers
// =============================================================================

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/password", put(auth::change_password))
}

/// Create the password reset routes router.
pub fn password_reset_routes() -> Router<AppState> {
    Router::new()
        .route("/request", post(password_reset::request))
        .route("/validate/{token}", get(password_reset::validate))
        .route("/reset", post(password_reset::reset))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::list).post(products::create))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::deactivate),
        )
        .route("/{id}/images", post(products::add_image))
        .route(
            "/{id}/images/{image_id}",
            delete(products::delete_image),
        )
        .route(
            "/{id}/images/{image_id}/primary",
            put(products::set_primary_image),
        )
}

/// Create the client profile routes router.
pub fn client_profile_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(client_profiles::list).post(client_profiles::create),
        )
        .route(
            "/me",
            get(client_profiles::show_mine).put(client_profiles::update_mine),
        )
        .route(
            "/{id}",
            get(client_profiles::show).delete(client_profiles::delete),
        )
        .route("/{id}/approval", put(client_profiles::set_approval))
        .route(
            "/{id}/documents",
            get(client_profiles::list_documents)
                .post(client_profiles::upload_document)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/{id}/documents/{doc_id}",
            get(client_profiles::download_document),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list).post(orders::create))
        .route("/{id}", get(orders::show))
        .route("/{id}/status", put(orders::update_status))
        .route("/{id}/cancel", post(orders::cancel))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(payments::list).post(payments::record))
        .route("/{id}/review", put(payments::review))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/settings", get(admin::settings))
        .route("/settings/{key}", put(admin::update_setting))
        .route("/users", get(admin::users))
        .route("/users/{id}/role", put(admin::set_role))
        .route("/users/{id}/active", put(admin::set_active))
}

/// Create the SAP routes router.
pub fn sap_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/products", post(sap::sync_products))
        .route("/sync/clients", post(sap::sync_clients))
        .route("/sync/runs", get(sap::runs))
}

/// Create all routes.
///
/// Account and password reset endpoints share the strict limiter; the rest
/// of `/api` uses the relaxed one.
pub fn routes() -> Router<AppState> {
    let credential_routes = Router::new()
        .nest("/auth", auth_routes())
        .nest("/password-reset", password_reset_routes())
        .layer(auth_rate_limiter());

    let resource_routes = Router::new()
        .nest("/products", product_routes())
        .nest("/client-profiles", client_profile_routes())
        .nest("/orders", order_routes())
        .nest("/payments", payment_routes())
        .nest("/admin", admin_routes())
        .nest("/sap", sap_routes())
        .layer(api_rate_limiter());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", credential_routes.merge(resource_routes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed() {
        assert_eq!(trimmed(Some("  hola ".to_owned())).as_deref(), Some("hola"));
        assert_eq!(trimmed(Some("   ".to_owned())), None);
        assert_eq!(trimmed(None), None);
    }

    #[test]
    fn test_required() {
        assert_eq!(required(" Pan ", "name").ok().as_deref(), Some("Pan"));
        let err = required("  ", "name").err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("Bad request: name is required"));
    }
}
