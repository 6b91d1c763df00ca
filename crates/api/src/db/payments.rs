//! Payment database operations.

use sqlx::{PgConnection, PgPool};

use la_artesa_core::{Money, OrderId, PaymentId, PaymentMethod, PaymentStatus, UserId};

use super::RepositoryError;
use crate::models::Payment;

const PAYMENT_COLUMNS: &str =
    "id, order_id, method, status, amount, reference, reviewed_by, created_at, reviewed_at";

/// Record a pending payment.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert(
    pool: &PgPool,
    order_id: OrderId,
    method: PaymentMethod,
    amount: Money,
    reference: Option<&str>,
) -> Result<Payment, RepositoryError> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        r"
        INSERT INTO payments (order_id, method, amount, reference)
        VALUES ($1, $2, $3, $4)
        RETURNING {PAYMENT_COLUMNS}
        "
    ))
    .bind(order_id)
    .bind(method)
    .bind(amount)
    .bind(reference)
    .fetch_one(pool)
    .await?;

    Ok(payment)
}

/// Payments of an order, oldest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn for_order(pool: &PgPool, order_id: OrderId) -> Result<Vec<Payment>, RepositoryError> {
    let payments = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at, id"
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(payments)
}

/// Lock a payment for review.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock(
    conn: &mut PgConnection,
    id: PaymentId,
) -> Result<Option<Payment>, RepositoryError> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(payment)
}

/// Store a review decision.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the payment does not exist.
pub async fn set_review(
    conn: &mut PgConnection,
    id: PaymentId,
    status: PaymentStatus,
    reviewer: UserId,
) -> Result<Payment, RepositoryError> {
    sqlx::query_as::<_, Payment>(&format!(
        r"
        UPDATE payments SET status = $2, reviewed_by = $3, reviewed_at = NOW()
        WHERE id = $1
        RETURNING {PAYMENT_COLUMNS}
        "
    ))
    .bind(id)
    .bind(status)
    .bind(reviewer)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Sum of approved payments of an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn approved_total(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Money, RepositoryError> {
    let total: Money = sqlx::query_scalar(
        "SELECT LEAST(COALESCE(SUM(amount), 0), 9999999999.99) FROM payments \
         WHERE order_id = $1 AND status = 'approved'",
    )
    .bind(order_id)
    .fetch_one(conn)
    .await?;

    Ok(total)
}
