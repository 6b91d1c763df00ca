//! Payment recording and review.
//!
//! Approving a payment re-sums approved payments inside the review
//! transaction; once they cover the order total a pending order is
//! confirmed.

use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use la_artesa_core::{Money, OrderId, OrderStatus, PaymentId, PaymentMethod, PaymentStatus};

use super::orders::{OrderError, OrderService};
use crate::db::{RepositoryError, orders, payments};
use crate::models::{CurrentUser, Payment};

/// Longest accepted payment reference.
pub const MAX_REFERENCE_LENGTH: usize = 120;

/// Errors from payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("order not found")]
    OrderNotFound,

    #[error("payment not found")]
    NotFound,

    #[error("payments cannot be recorded for a cancelled order")]
    OrderCancelled,

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("reference must be at most 120 characters")]
    ReferenceTooLong,

    #[error("payment was already reviewed")]
    AlreadyReviewed,

    #[error("a review must approve or reject")]
    InvalidDecision,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for PaymentError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

impl From<OrderError> for PaymentError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Repository(e) => Self::Repository(e),
            _ => Self::OrderNotFound,
        }
    }
}

/// Whether approved payments settle an order.
#[must_use]
pub fn covers_total(approved: Money, total: Money) -> bool {
    approved >= total
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub reference: Option<String>,
}

/// Outcome of a review.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub payment: Payment,
    /// Set when the review confirmed the order.
    pub order_confirmed: bool,
}

/// Payment service.
pub struct PaymentService<'a> {
    pool: &'a PgPool,
}

impl<'a> PaymentService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a pending payment on a visible order.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::OrderNotFound` for orders the user cannot see,
    /// `PaymentError::OrderCancelled` for cancelled orders and
    /// `PaymentError::InvalidAmount` for non-positive amounts.
    #[instrument(skip(self, user, input), fields(user_id = %user.id, order_id = %input.order_id))]
    pub async fn record(
        &self,
        user: &CurrentUser,
        input: RecordPayment,
    ) -> Result<Payment, PaymentError> {
        let amount = Money::new(input.amount).map_err(|_| PaymentError::InvalidAmount)?;
        if amount == Money::ZERO {
            return Err(PaymentError::InvalidAmount);
        }
        let reference = input
            .reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());
        if reference.is_some_and(|r| r.chars().count() > MAX_REFERENCE_LENGTH) {
            return Err(PaymentError::ReferenceTooLong);
        }

        let order = OrderService::new(self.pool)
            .visible_order(user, input.order_id)
            .await?;
        if order.status == OrderStatus::Cancelled {
            return Err(PaymentError::OrderCancelled);
        }

        let payment =
            payments::insert(self.pool, order.id, input.method, amount, reference).await?;
        tracing::info!(payment_id = %payment.id, amount = %amount, "Payment recorded");
        Ok(payment)
    }

    /// Payments of a visible order.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::OrderNotFound` for orders the user cannot see.
    pub async fn list(
        &self,
        user: &CurrentUser,
        order_id: OrderId,
    ) -> Result<Vec<Payment>, PaymentError> {
        let order = OrderService::new(self.pool)
            .visible_order(user, order_id)
            .await?;
        Ok(payments::for_order(self.pool, order.id).await?)
    }

    /// Approve or reject a pending payment (admin).
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::AlreadyReviewed` unless the payment is pending
    /// and `PaymentError::InvalidDecision` for a `pending` decision.
    #[instrument(skip(self, reviewer), fields(reviewer = %reviewer.id))]
    pub async fn review(
        &self,
        reviewer: &CurrentUser,
        id: PaymentId,
        decision: PaymentStatus,
    ) -> Result<ReviewOutcome, PaymentError> {
        if decision == PaymentStatus::Pending {
            return Err(PaymentError::InvalidDecision);
        }

        let mut tx = self.pool.begin().await?;
        let current = payments::lock(&mut *tx, id)
            .await?
            .ok_or(PaymentError::NotFound)?;
        if current.status != PaymentStatus::Pending {
            return Err(PaymentError::AlreadyReviewed);
        }

        // Lock the order before summing so concurrent approvals see each other
        let order = orders::lock(&mut *tx, current.order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound)?;

        let payment = payments::set_review(&mut *tx, id, decision, reviewer.id).await?;

        let mut order_confirmed = false;
        if decision == PaymentStatus::Approved && order.status == OrderStatus::Pending {
            let approved = payments::approved_total(&mut *tx, order.id).await?;
            if covers_total(approved, order.total) {
                orders::set_status(&mut *tx, order.id, OrderStatus::Confirmed).await?;
                order_confirmed = true;
            }
        }
        tx.commit().await?;

        tracing::info!(
            payment_id = %id,
            status = %decision,
            order_confirmed,
            "Payment reviewed"
        );
        Ok(ReviewOutcome {
            payment,
            order_confirmed,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn money(s: &str) -> Money {
        Money::new(Decimal::from_str(s).unwrap()).unwrap()
    }

    #[test]
    fn test_covers_total() {
        assert!(covers_total(money("100.00"), money("100.00")));
        assert!(covers_total(money("150.00"), money("100.00")));
        assert!(!covers_total(money("99.99"), money("100.00")));
        assert!(!covers_total(Money::ZERO, money("0.01")));
    }

    #[test]
    fn test_order_errors_collapse_to_not_found() {
        let err: PaymentError = OrderError::NotFound.into();
        assert!(matches!(err, PaymentError::OrderNotFound));
    }
}
