//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error body has the same shape:
//!
//! ```json
//! {"success": false, "errorCode": "INVALID_TOKEN", "message": "invalid or expired token"}
//! ```

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{
    AuthError, DocumentError, OrderError, PasswordResetError, PaymentError, RecaptchaError,
    SapError,
};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Password reset flow failed.
    #[error("Password reset error: {0}")]
    PasswordReset(#[from] PasswordResetError),

    /// reCAPTCHA gate rejected or could not run.
    #[error("reCAPTCHA error: {0}")]
    Recaptcha(#[from] RecaptchaError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("SAP error: {0}")]
    Sap(#[from] SapError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The current user already has a client profile.
    #[error("Client profile already exists")]
    ProfileExists,

    /// Another client profile is registered with the tax ID.
    #[error("Tax ID already registered")]
    TaxIdTaken,

    /// Setting key is not one of the known keys.
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    /// SAP settings are absent.
    #[error("SAP integration is not configured")]
    SapNotConfigured,

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error_code: &'static str,
    pub message: String,
}

const INTERNAL_MESSAGE: &str = "Internal server error";

type Parts = (StatusCode, &'static str, String);

fn internal() -> Parts {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        INTERNAL_MESSAGE.to_owned(),
    )
}

fn repository_parts(err: &RepositoryError) -> Parts {
    match err {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", "Not found".to_owned()),
        RepositoryError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => internal(),
    }
}

fn recaptcha_parts(err: &RecaptchaError) -> Parts {
    match err {
        RecaptchaError::MissingToken | RecaptchaError::Rejected { .. } => (
            StatusCode::BAD_REQUEST,
            "RECAPTCHA_FAILED",
            "reCAPTCHA verification failed".to_owned(),
        ),
        RecaptchaError::Unavailable(_) => (
            StatusCode::BAD_GATEWAY,
            "RECAPTCHA_UNAVAILABLE",
            "reCAPTCHA verification is unavailable, please try again".to_owned(),
        ),
    }
}

fn auth_parts(err: &AuthError) -> Parts {
    match err {
        AuthError::InvalidEmail(_) => (
            StatusCode::BAD_REQUEST,
            "INVALID_EMAIL",
            "Invalid email address".to_owned(),
        ),
        AuthError::InvalidCredentials | AuthError::UserNotFound => (
            StatusCode::UNAUTHORIZED,
            "INVALID_CREDENTIALS",
            "Invalid email or password".to_owned(),
        ),
        AuthError::AccountDisabled => (
            StatusCode::FORBIDDEN,
            "ACCOUNT_DISABLED",
            "This account has been disabled".to_owned(),
        ),
        AuthError::EmailTaken => (
            StatusCode::CONFLICT,
            "EMAIL_TAKEN",
            "An account with this email already exists".to_owned(),
        ),
        AuthError::WeakPassword(msg) => (StatusCode::BAD_REQUEST, "WEAK_PASSWORD", msg.clone()),
        AuthError::MissingField(_) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
        }
        AuthError::Repository(e) => repository_parts(e),
        AuthError::PasswordHash => internal(),
    }
}

fn password_reset_parts(err: &PasswordResetError) -> Parts {
    match err {
        PasswordResetError::Recaptcha(e) => recaptcha_parts(e),
        PasswordResetError::InvalidEmail(_) => (
            StatusCode::BAD_REQUEST,
            "INVALID_EMAIL",
            "Invalid email address".to_owned(),
        ),
        PasswordResetError::InvalidToken => (
            StatusCode::BAD_REQUEST,
            "INVALID_TOKEN",
            "This reset link is invalid or has expired".to_owned(),
        ),
        PasswordResetError::WeakPassword(msg) => {
            (StatusCode::BAD_REQUEST, "WEAK_PASSWORD", msg.clone())
        }
        PasswordResetError::Email(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "EMAIL_SEND_FAILED",
            "The reset email could not be sent, please try again".to_owned(),
        ),
        PasswordResetError::Repository(e) => repository_parts(e),
        PasswordResetError::PasswordHash => internal(),
    }
}

fn order_parts(err: &OrderError) -> Parts {
    let (status, code) = match err {
        OrderError::OrdersDisabled => (StatusCode::SERVICE_UNAVAILABLE, "ORDERS_DISABLED"),
        OrderError::ProfileRequired => (StatusCode::BAD_REQUEST, "PROFILE_REQUIRED"),
        OrderError::ProfileNotApproved => (StatusCode::FORBIDDEN, "PROFILE_NOT_APPROVED"),
        OrderError::EmptyOrder => (StatusCode::BAD_REQUEST, "EMPTY_ORDER"),
        OrderError::InvalidQuantity { .. } => (StatusCode::BAD_REQUEST, "INVALID_QUANTITY"),
        OrderError::NotesTooLong => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        OrderError::ProductUnavailable(_) => (StatusCode::BAD_REQUEST, "PRODUCT_UNAVAILABLE"),
        OrderError::BelowMinimum { .. } => (StatusCode::BAD_REQUEST, "BELOW_MINIMUM"),
        OrderError::DeliveryTooSoon { .. } => (StatusCode::BAD_REQUEST, "DELIVERY_TOO_SOON"),
        OrderError::NotFound => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
        OrderError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
        OrderError::Money(_) => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
        OrderError::Repository(e) => return repository_parts(e),
    };
    (status, code, err.to_string())
}

fn payment_parts(err: &PaymentError) -> Parts {
    let (status, code) = match err {
        PaymentError::OrderNotFound => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
        PaymentError::NotFound => (StatusCode::NOT_FOUND, "PAYMENT_NOT_FOUND"),
        PaymentError::OrderCancelled => (StatusCode::CONFLICT, "ORDER_CANCELLED"),
        PaymentError::InvalidAmount => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
        PaymentError::ReferenceTooLong | PaymentError::InvalidDecision => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
        }
        PaymentError::AlreadyReviewed => (StatusCode::CONFLICT, "ALREADY_REVIEWED"),
        PaymentError::Repository(e) => return repository_parts(e),
    };
    (status, code, err.to_string())
}

fn document_parts(err: &DocumentError) -> Parts {
    let (status, code) = match err {
        DocumentError::Empty => (StatusCode::BAD_REQUEST, "EMPTY_FILE"),
        DocumentError::TooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
        DocumentError::UnsupportedType => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_FILE_TYPE")
        }
        DocumentError::Missing => (StatusCode::NOT_FOUND, "FILE_MISSING"),
        DocumentError::InvalidKey | DocumentError::Io(_) | DocumentError::ObjectStore(_) => {
            return internal();
        }
    };
    (status, code, err.to_string())
}

fn sap_parts(err: &SapError) -> Parts {
    match err {
        SapError::Http(_) | SapError::Login { .. } | SapError::Api { .. } => (
            StatusCode::BAD_GATEWAY,
            "SAP_UNAVAILABLE",
            "SAP is unavailable".to_owned(),
        ),
        SapError::SyncInProgress => (
            StatusCode::CONFLICT,
            "SYNC_IN_PROGRESS",
            err.to_string(),
        ),
        SapError::Repository(e) => repository_parts(e),
    }
}

impl AppError {
    /// Status, error code and client-facing message.
    ///
    /// Internal details never reach the message of a 5xx response.
    #[must_use]
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::Database(e) => repository_parts(e),
            Self::Auth(e) => auth_parts(e),
            Self::PasswordReset(e) => password_reset_parts(e),
            Self::Recaptcha(e) => recaptcha_parts(e),
            Self::Order(e) => order_parts(e),
            Self::Payment(e) => payment_parts(e),
            Self::Document(e) => document_parts(e),
            Self::Sap(e) => sap_parts(e),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found")),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Self::ProfileExists => (
                StatusCode::CONFLICT,
                "PROFILE_EXISTS",
                "You already have a client profile".to_owned(),
            ),
            Self::TaxIdTaken => (
                StatusCode::CONFLICT,
                "TAX_ID_TAKEN",
                "This tax ID is already registered to another client".to_owned(),
            ),
            Self::UnknownSetting(key) => (
                StatusCode::BAD_REQUEST,
                "UNKNOWN_SETTING",
                format!("Unknown setting: {key}"),
            ),
            Self::SapNotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SAP_NOT_CONFIGURED",
                self.to_string(),
            ),
            Self::Session(_) | Self::Internal(_) => internal(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();

        // Capture server errors to Sentry
        if status == StatusCode::INTERNAL_SERVER_ERROR || status == StatusCode::BAD_GATEWAY {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                error_code,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, error_code, "Request rejected");
        }

        let body = ErrorBody {
            success: false,
            error_code,
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use la_artesa_core::{MoneyError, OrderStatus, ProductId};

    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product".to_string());
        assert_eq!(err.to_string(), "Not found: product");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let (status, body) = body_json(PasswordResetError::InvalidToken.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["errorCode"], "INVALID_TOKEN");
        assert!(body["message"].as_str().unwrap().contains("expired"));
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let (status, body) = body_json(AppError::Internal("pool exhausted".to_owned())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["errorCode"], "INTERNAL_ERROR");
        assert_eq!(body["message"], INTERNAL_MESSAGE);

        let (_, body) = body_json(AppError::Database(RepositoryError::DataCorruption(
            "bad role".to_owned(),
        )))
        .await;
        assert_eq!(body["message"], INTERNAL_MESSAGE);
    }

    #[test]
    fn test_status_and_codes() {
        let cases: Vec<(AppError, StatusCode, &str)> = vec![
            (
                AuthError::InvalidCredentials.into(),
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
            ),
            (
                AuthError::AccountDisabled.into(),
                StatusCode::FORBIDDEN,
                "ACCOUNT_DISABLED",
            ),
            (AuthError::EmailTaken.into(), StatusCode::CONFLICT, "EMAIL_TAKEN"),
            (
                RecaptchaError::MissingToken.into(),
                StatusCode::BAD_REQUEST,
                "RECAPTCHA_FAILED",
            ),
            (
                PasswordResetError::Recaptcha(RecaptchaError::MissingToken).into(),
                StatusCode::BAD_REQUEST,
                "RECAPTCHA_FAILED",
            ),
            (
                PasswordResetError::WeakPassword("too short".to_owned()).into(),
                StatusCode::BAD_REQUEST,
                "WEAK_PASSWORD",
            ),
            (
                OrderError::OrdersDisabled.into(),
                StatusCode::SERVICE_UNAVAILABLE,
                "ORDERS_DISABLED",
            ),
            (
                OrderError::ProfileNotApproved.into(),
                StatusCode::FORBIDDEN,
                "PROFILE_NOT_APPROVED",
            ),
            (
                OrderError::ProductUnavailable(vec![ProductId::new(4)]).into(),
                StatusCode::BAD_REQUEST,
                "PRODUCT_UNAVAILABLE",
            ),
            (
                OrderError::InvalidTransition {
                    from: OrderStatus::Delivered,
                    to: OrderStatus::Pending,
                }
                .into(),
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
            ),
            (
                OrderError::Money(MoneyError::Overflow).into(),
                StatusCode::BAD_REQUEST,
                "INVALID_AMOUNT",
            ),
            (
                PaymentError::InvalidAmount.into(),
                StatusCode::BAD_REQUEST,
                "INVALID_AMOUNT",
            ),
            (
                PaymentError::AlreadyReviewed.into(),
                StatusCode::CONFLICT,
                "ALREADY_REVIEWED",
            ),
            (
                DocumentError::TooLarge.into(),
                StatusCode::PAYLOAD_TOO_LARGE,
                "FILE_TOO_LARGE",
            ),
            (
                SapError::SyncInProgress.into(),
                StatusCode::CONFLICT,
                "SYNC_IN_PROGRESS",
            ),
            (
                AppError::SapNotConfigured,
                StatusCode::SERVICE_UNAVAILABLE,
                "SAP_NOT_CONFIGURED",
            ),
            (AppError::ProfileExists, StatusCode::CONFLICT, "PROFILE_EXISTS"),
            (AppError::TaxIdTaken, StatusCode::CONFLICT, "TAX_ID_TAKEN"),
            (
                AppError::UnknownSetting("colour".to_owned()),
                StatusCode::BAD_REQUEST,
                "UNKNOWN_SETTING",
            ),
            (
                RepositoryError::NotFound.into(),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
        ];

        for (err, status, code) in cases {
            let (got_status, got_code, _) = err.parts();
            assert_eq!(got_status, status, "{err}");
            assert_eq!(got_code, code, "{err}");
        }
    }
}
