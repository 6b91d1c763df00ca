//! Order database operations.

use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use la_artesa_core::{ClientProfileId, Money, OrderId, OrderStatus, ProductId, UserId};

use super::RepositoryError;
use crate::models::{Order, OrderDetail};

const ORDER_COLUMNS: &str = "id, user_id, client_profile_id, status, subtotal, tax, total, \
                             delivery_date, notes, created_at, updated_at";

/// A priced order line ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLine {
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Money,
    pub line_total: Money,
}

/// A priced order ready to be stored.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub client_profile_id: ClientProfileId,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub delivery_date: Option<NaiveDate>,
    pub notes: String,
    pub lines: Vec<NewLine>,
}

/// Filters for listing orders.
#[derive(Debug, Default, Clone)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Insert an order header and its lines on the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if any insert fails.
pub async fn insert(conn: &mut PgConnection, new: &NewOrder) -> Result<Order, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        r"
        INSERT INTO orders (user_id, client_profile_id, subtotal, tax, total, delivery_date, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(new.user_id)
    .bind(new.client_profile_id)
    .bind(new.subtotal)
    .bind(new.tax)
    .bind(new.total)
    .bind(new.delivery_date)
    .bind(&new.notes)
    .fetch_one(&mut *conn)
    .await?;

    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
        "INSERT INTO order_details (order_id, product_id, quantity, unit_price, line_total) ",
    );
    qb.push_values(&new.lines, |mut row, line| {
        row.push_bind(order.id)
            .push_bind(line.product_id)
            .push_bind(line.quantity)
            .push_bind(line.unit_price)
            .push_bind(line.line_total);
    });
    qb.build().execute(&mut *conn).await?;

    Ok(order)
}

/// List orders matching a filter, newest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list(pool: &PgPool, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE TRUE"));
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(filter.limit)
        .push(" OFFSET ")
        .push_bind(filter.offset);

    let orders = qb.build_query_as::<Order>().fetch_all(pool).await?;
    Ok(orders)
}

/// Get an order header.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get(pool: &PgPool, id: OrderId) -> Result<Option<Order>, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(order)
}

/// Lock an order row for a status change.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock(conn: &mut PgConnection, id: OrderId) -> Result<Option<Order>, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(order)
}

/// Lines of an order with product names.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn details(pool: &PgPool, id: OrderId) -> Result<Vec<OrderDetail>, RepositoryError> {
    let details = sqlx::query_as::<_, OrderDetail>(
        r"
        SELECT d.id, d.order_id, d.product_id, p.name AS product_name,
               d.quantity, d.unit_price, d.line_total
        FROM order_details d
        JOIN products p ON p.id = d.product_id
        WHERE d.order_id = $1
        ORDER BY d.id
        ",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(details)
}

/// Write a new status on the caller's transaction.
///
/// Transition rules are checked by the caller against the locked row.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order does not exist.
pub async fn set_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: OrderStatus,
) -> Result<Order, RepositoryError> {
    sqlx::query_as::<_, Order>(&format!(
        "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {ORDER_COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}
