//! Success envelope for JSON responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// `{"success": true, "data": ..., "message"?: ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    /// `200 OK` with data.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            status: StatusCode::OK,
        }
    }

    /// `201 Created` with data.
    pub const fn created(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            status: StatusCode::CREATED,
        }
    }

    /// `202 Accepted` with data.
    pub const fn accepted(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            status: StatusCode::ACCEPTED,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// `200 OK` carrying only a message; `data` is `null`.
    pub fn message(message: impl Into<String>) -> Self {
        Self::ok(()).with_message(message)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::json;

    use super::*;

    async fn render<T: Serialize>(resp: ApiResponse<T>) -> (StatusCode, serde_json::Value) {
        let response = resp.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_ok_envelope_omits_message() {
        let (status, body) = render(ApiResponse::ok(json!({"id": 1}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "data": {"id": 1}}));
    }

    #[tokio::test]
    async fn test_message_only() {
        let (status, body) = render(ApiResponse::message("Logged out")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"success": true, "data": null, "message": "Logged out"})
        );
    }

    #[tokio::test]
    async fn test_created_and_accepted_status() {
        assert_eq!(render(ApiResponse::created(1)).await.0, StatusCode::CREATED);
        assert_eq!(render(ApiResponse::accepted(1)).await.0, StatusCode::ACCEPTED);
    }
}
