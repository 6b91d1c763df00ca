//! Order route handlers.

use axum::extract::State;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Deserialize;

use la_artesa_core::{OrderId, OrderStatus, ProductId, UserId};

use super::{ApiJson, ApiPath, ApiQuery};
use crate::db::{self, orders::OrderFilter};
use crate::error::AppError;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{Order, OrderWithDetails};
use crate::response::ApiResponse;
use crate::services::OrderService;
use crate::services::orders::{OrderItem, PlaceOrder};
use crate::state::AppState;

/// Bogotá is UTC-5 all year.
const BOGOTA_OFFSET_SECS: i32 = 5 * 3600;

/// Calendar date in Colombia, used for delivery lead times.
fn local_date(now: DateTime<Utc>) -> NaiveDate {
    FixedOffset::west_opt(BOGOTA_OFFSET_SECS)
        .map_or_else(|| now.date_naive(), |tz| now.with_timezone(&tz).date_naive())
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<ItemRequest>,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub status: Option<OrderStatus>,
    #[serde(alias = "user_id")]
    pub user_id: Option<UserId>,
    pub page: Option<u32>,
    #[serde(alias = "per_page")]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<CreateOrderRequest>,
) -> Result<ApiResponse<OrderWithDetails>, AppError> {
    let input = PlaceOrder {
        items: body
            .items
            .iter()
            .map(|i| OrderItem {
                product_id: i.product_id,
                quantity: i.quantity,
            })
            .collect(),
        delivery_date: body.delivery_date,
        notes: body.notes,
    };

    let order = OrderService::new(state.pool())
        .place(&user, input, local_date(Utc::now()))
        .await?;
    Ok(ApiResponse::created(order).with_message("Order placed"))
}

/// Clients get their own orders; admins may filter by client and status.
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<ApiResponse<Vec<Order>>, AppError> {
    let (limit, offset) = db::page_bounds(query.page, query.per_page);
    let filter = OrderFilter {
        user_id: query.user_id,
        status: query.status,
        limit,
        offset,
    };

    let orders = OrderService::new(state.pool()).list(&user, filter).await?;
    Ok(ApiResponse::ok(orders))
}

pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiResponse<OrderWithDetails>, AppError> {
    let order = OrderService::new(state.pool()).get(&user, id).await?;
    Ok(ApiResponse::ok(order))
}

pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(body): ApiJson<StatusRequest>,
) -> Result<ApiResponse<Order>, AppError> {
    let order = OrderService::new(state.pool())
        .update_status(id, body.status)
        .await?;
    Ok(ApiResponse::ok(order))
}

pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiResponse<Order>, AppError> {
    let order = OrderService::new(state.pool()).cancel(&user, id).await?;
    Ok(ApiResponse::ok(order).with_message("Order cancelled"))
}
