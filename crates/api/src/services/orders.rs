//! Order placement and lifecycle.
//!
//! Pricing is a pure function of the requested items, the locked product
//! rows and the current settings, so it can be tested without a database.
//! Placement locks the products (`FOR SHARE`) and inserts the order in one
//! transaction; status changes lock the order row (`FOR UPDATE`).

use std::collections::HashMap;

use chrono::{NaiveDate, TimeDelta};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use la_artesa_core::{Money, MoneyError, OrderId, OrderStatus, ProductId};

use crate::db::orders::{self, NewLine, NewOrder, OrderFilter};
use crate::db::{RepositoryError, client_profiles, payments, products, settings};
use crate::models::{CurrentUser, Order, OrderWithDetails, Product, Settings};

/// Largest quantity accepted for a single product line.
pub const MAX_QUANTITY: i32 = 10_000;

/// Longest accepted order note, in characters.
pub const MAX_NOTES_LENGTH: usize = 1_000;

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("orders are temporarily disabled")]
    OrdersDisabled,

    #[error("a client profile is required to place orders")]
    ProfileRequired,

    #[error("client profile is pending approval")]
    ProfileNotApproved,

    #[error("order has no items")]
    EmptyOrder,

    #[error("quantity for product {product_id} must be between 1 and 10000")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    #[error("notes must be at most 1000 characters")]
    NotesTooLong,

    #[error("products not available: {}", join_ids(.0))]
    ProductUnavailable(Vec<ProductId>),

    #[error("order subtotal {subtotal} is below the minimum of {minimum}")]
    BelowMinimum { minimum: Money, subtotal: Money },

    #[error("earliest delivery date is {earliest}")]
    DeliveryTooSoon { earliest: NaiveDate },

    #[error("order not found")]
    NotFound,

    #[error("cannot change order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("amount error: {0}")]
    Money(#[from] MoneyError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

fn join_ids(ids: &[ProductId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// One requested line, as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Merge duplicate product lines and check quantities.
///
/// Line order follows the first occurrence of each product.
///
/// # Errors
///
/// Returns `OrderError::EmptyOrder` for no items and
/// `OrderError::InvalidQuantity` when a line or merged total is out of range.
pub fn merge_items(items: &[OrderItem]) -> Result<Vec<(ProductId, i32)>, OrderError> {
    if items.is_empty() {
        return Err(OrderError::EmptyOrder);
    }

    let mut merged: Vec<(ProductId, i64)> = Vec::with_capacity(items.len());
    let mut index: HashMap<ProductId, usize> = HashMap::new();
    for item in items {
        if !(1..=i64::from(MAX_QUANTITY)).contains(&item.quantity) {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
                quantity: item.quantity,
            });
        }
        match index.get(&item.product_id) {
            Some(&i) => {
                if let Some(line) = merged.get_mut(i) {
                    line.1 += item.quantity;
                }
            }
            None => {
                index.insert(item.product_id, merged.len());
                merged.push((item.product_id, item.quantity));
            }
        }
    }

    merged
        .into_iter()
        .map(|(product_id, quantity)| {
            i32::try_from(quantity)
                .ok()
                .filter(|q| *q <= MAX_QUANTITY)
                .map(|q| (product_id, q))
                .ok_or(OrderError::InvalidQuantity {
                    product_id,
                    quantity,
                })
        })
        .collect()
}

/// Totals of a priced order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
    pub lines: Vec<NewLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

/// Price merged lines against current product rows and settings.
///
/// # Errors
///
/// Returns `OrderError::ProductUnavailable` listing every product that is
/// missing or inactive, and `OrderError::BelowMinimum` when the subtotal does
/// not reach the configured minimum.
pub fn price_order(
    lines: &[(ProductId, i32)],
    catalog: &[Product],
    settings: &Settings,
) -> Result<PricedOrder, OrderError> {
    let by_id: HashMap<ProductId, &Product> = catalog
        .iter()
        .filter(|p| p.is_active)
        .map(|p| (p.id, p))
        .collect();

    let missing: Vec<ProductId> = lines
        .iter()
        .map(|(id, _)| *id)
        .filter(|id| !by_id.contains_key(id))
        .collect();
    if !missing.is_empty() {
        return Err(OrderError::ProductUnavailable(missing));
    }

    let mut priced = Vec::with_capacity(lines.len());
    let mut subtotal = Money::ZERO;
    for &(product_id, quantity) in lines {
        let Some(product) = by_id.get(&product_id) else {
            return Err(OrderError::ProductUnavailable(vec![product_id]));
        };
        let line_total = product.price.times(quantity)?;
        subtotal = subtotal.checked_add(line_total)?;
        priced.push(NewLine {
            product_id,
            quantity,
            unit_price: product.price,
            line_total,
        });
    }

    if subtotal < settings.min_order_amount {
        return Err(OrderError::BelowMinimum {
            minimum: settings.min_order_amount,
            subtotal,
        });
    }

    let tax = subtotal.apply_rate(settings.tax_rate)?;
    let total = subtotal.checked_add(tax)?;

    Ok(PricedOrder {
        lines: priced,
        subtotal,
        tax,
        total,
    })
}

/// First date an order placed on `today` can be delivered.
#[must_use]
pub fn earliest_delivery(today: NaiveDate, lead_time_days: u32) -> NaiveDate {
    today + TimeDelta::days(i64::from(lead_time_days))
}

/// Check a requested delivery date against the lead time.
///
/// # Errors
///
/// Returns `OrderError::DeliveryTooSoon` when the date is before the earliest
/// allowed one.
pub fn check_delivery_date(
    requested: Option<NaiveDate>,
    today: NaiveDate,
    lead_time_days: u32,
) -> Result<(), OrderError> {
    let earliest = earliest_delivery(today, lead_time_days);
    match requested {
        Some(date) if date < earliest => Err(OrderError::DeliveryTooSoon { earliest }),
        _ => Ok(()),
    }
}

/// Input for placing an order.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub items: Vec<OrderItem>,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Order service.
pub struct OrderService<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Place an order for the current user.
    ///
    /// # Errors
    ///
    /// See [`OrderError`]; every business rule maps to its own variant.
    #[instrument(skip(self, user, input), fields(user_id = %user.id))]
    pub async fn place(
        &self,
        user: &CurrentUser,
        input: PlaceOrder,
        today: NaiveDate,
    ) -> Result<OrderWithDetails, OrderError> {
        let settings = settings::load(self.pool).await?;
        if !settings.orders_enabled {
            return Err(OrderError::OrdersDisabled);
        }

        let profile = client_profiles::get_by_user(self.pool, user.id)
            .await?
            .ok_or(OrderError::ProfileRequired)?;
        if !profile.is_approved {
            return Err(OrderError::ProfileNotApproved);
        }

        let notes = input.notes.as_deref().map(str::trim).unwrap_or_default();
        if notes.chars().count() > MAX_NOTES_LENGTH {
            return Err(OrderError::NotesTooLong);
        }

        let lines = merge_items(&input.items)?;
        check_delivery_date(input.delivery_date, today, settings.lead_time_days)?;

        let ids: Vec<ProductId> = lines.iter().map(|(id, _)| *id).collect();

        let mut tx = self.pool.begin().await?;
        let catalog = products::lock_active_by_ids(&mut *tx, &ids).await?;
        let priced = price_order(&lines, &catalog, &settings)?;

        let order = orders::insert(
            &mut *tx,
            &NewOrder {
                user_id: user.id,
                client_profile_id: profile.id,
                subtotal: priced.subtotal,
                tax: priced.tax,
                total: priced.total,
                delivery_date: input.delivery_date,
                notes: notes.to_owned(),
                lines: priced.lines,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, total = %order.total, "Order placed");
        self.with_details(order).await
    }

    /// List orders. Clients only see their own.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn list(
        &self,
        user: &CurrentUser,
        mut filter: OrderFilter,
    ) -> Result<Vec<Order>, OrderError> {
        if !user.is_admin() {
            filter.user_id = Some(user.id);
        }
        Ok(orders::list(self.pool, &filter).await?)
    }

    /// Get an order with lines and payments.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist or belongs
    /// to another client.
    pub async fn get(&self, user: &CurrentUser, id: OrderId) -> Result<OrderWithDetails, OrderError> {
        let order = self.visible_order(user, id).await?;
        self.with_details(order).await
    }

    /// Load an order header the user may see.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist or belongs
    /// to another client.
    pub async fn visible_order(&self, user: &CurrentUser, id: OrderId) -> Result<Order, OrderError> {
        orders::get(self.pool, id)
            .await?
            .filter(|o| user.is_admin() || o.user_id == user.id)
            .ok_or(OrderError::NotFound)
    }

    async fn with_details(&self, order: Order) -> Result<OrderWithDetails, OrderError> {
        let details = orders::details(self.pool, order.id).await?;
        let payments = payments::for_order(self.pool, order.id).await?;
        Ok(OrderWithDetails {
            order,
            details,
            payments,
        })
    }

    /// Move an order to a new status (admin).
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InvalidTransition` if the status table forbids it.
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: OrderId, next: OrderStatus) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await?;
        let current = orders::lock(&mut *tx, id).await?.ok_or(OrderError::NotFound)?;
        if !current.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }
        let order = orders::set_status(&mut *tx, id, next).await?;
        tx.commit().await?;

        tracing::info!(order_id = %id, from = %current.status, to = %next, "Order status changed");
        Ok(order)
    }

    /// Cancel an own order while it is still pending.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` for orders of other clients and
    /// `OrderError::InvalidTransition` once the order left `pending`.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn cancel(&self, user: &CurrentUser, id: OrderId) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await?;
        let current = orders::lock(&mut *tx, id)
            .await?
            .filter(|o| o.user_id == user.id)
            .ok_or(OrderError::NotFound)?;
        if current.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                from: current.status,
                to: OrderStatus::Cancelled,
            });
        }
        let order = orders::set_status(&mut *tx, id, OrderStatus::Cancelled).await?;
        tx.commit().await?;

        tracing::info!(order_id = %id, "Order cancelled by client");
        Ok(order)
    }
}
