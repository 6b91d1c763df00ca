//! Order and payment types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use la_artesa_core::{
    ClientProfileId, Money, OrderDetailId, OrderId, OrderStatus, PaymentId, PaymentMethod,
    PaymentStatus, ProductId, UserId,
};

/// Order header.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub client_profile_id: ClientProfileId,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub delivery_date: Option<NaiveDate>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One order line, with the product name joined in for display.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    pub id: OrderDetailId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Money,
    pub line_total: Money,
}

/// A payment recorded against an order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount: Money,
    pub reference: Option<String>,
    pub reviewed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// An order with everything the detail view shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithDetails {
    #[serde(flatten)]
    pub order: Order,
    pub details: Vec<OrderDetail>,
    pub payments: Vec<Payment>,
}
