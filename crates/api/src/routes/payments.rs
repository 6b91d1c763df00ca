//! Payment route handlers.

use axum::extract::State;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use la_artesa_core::{OrderId, PaymentId, PaymentMethod, PaymentStatus};

use super::{ApiJson, ApiPath, ApiQuery};
use crate::error::AppError;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::Payment;
use crate::response::ApiResponse;
use crate::services::PaymentService;
use crate::services::payments::RecordPayment;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentRequest {
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(alias = "order_id")]
    pub order_id: OrderId,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    /// `approved` or `rejected`.
    pub status: PaymentStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub payment: Payment,
    pub order_confirmed: bool,
}

pub async fn record(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<RecordPaymentRequest>,
) -> Result<ApiResponse<Payment>, AppError> {
    let payment = PaymentService::new(state.pool())
        .record(
            &user,
            RecordPayment {
                order_id: body.order_id,
                method: body.method,
                amount: body.amount,
                reference: body.reference,
            },
        )
        .await?;
    Ok(ApiResponse::created(payment).with_message("Payment recorded, pending review"))
}

pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<ApiResponse<Vec<Payment>>, AppError> {
    let payments = PaymentService::new(state.pool())
        .list(&user, query.order_id)
        .await?;
    Ok(ApiResponse::ok(payments))
}

/// Approve or reject a pending payment; approval may confirm the order.
pub async fn review(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<PaymentId>,
    ApiJson(body): ApiJson<ReviewRequest>,
) -> Result<ApiResponse<ReviewResponse>, AppError> {
    let outcome = PaymentService::new(state.pool())
        .review(&admin, id, body.status)
        .await?;
    Ok(ApiResponse::ok(ReviewResponse {
        payment: outcome.payment,
        order_confirmed: outcome.order_confirmed,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use axum::extract::Query;
    use axum::http::Uri;

    use super::*;

    #[test]
    fn test_record_request_accepts_string_amount() {
        let body: RecordPaymentRequest = serde_json::from_str(
            r#"{"orderId":9,"method":"transfer","amount":"125000.50","reference":"TRX-1"}"#,
        )
        .unwrap();
        assert_eq!(body.order_id, OrderId::new(9));
        assert_eq!(body.method, PaymentMethod::Transfer);
        assert_eq!(body.amount, Decimal::from_str("125000.50").unwrap());
    }

    #[test]
    fn test_list_query_requires_order_id() {
        let uri: Uri = "/api/payments?orderId=12".parse().unwrap();
        let Query(q) = Query::<ListQuery>::try_from_uri(&uri).unwrap();
        assert_eq!(q.order_id, OrderId::new(12));

        let uri: Uri = "/api/payments".parse().unwrap();
        assert!(Query::<ListQuery>::try_from_uri(&uri).is_err());
    }

    #[test]
    fn test_review_request_status() {
        let body: ReviewRequest = serde_json::from_str(r#"{"status":"rejected"}"#).unwrap();
        assert_eq!(body.status, PaymentStatus::Rejected);
    }
}
