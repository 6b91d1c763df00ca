//! Database operations for the La Artesa `PostgreSQL` store.
//!
//! ## Tables
//!
//! - `users` - Accounts with argon2 password hashes and roles
//! - `password_resets` - Hashed single-use reset tokens
//! - `products`, `product_images` - Catalog (partly synced from SAP)
//! - `client_profiles`, `client_documents` - Wholesale client onboarding
//! - `orders`, `order_details` - Orders and their lines
//! - `payments` - Payments recorded against orders
//! - `settings` - Admin-editable JSON settings
//! - `sap_sync_runs` - SAP import history
//! - `tower_sessions.session` - Session storage
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p la-artesa-cli -- migrate
//! ```

pub mod client_profiles;
pub mod orders;
pub mod password_resets;
pub mod payments;
pub mod products;
pub mod sap_sync;
pub mod settings;
pub mod users;

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use thiserror::Error;

/// Errors returned by repository functions.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The underlying query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A row was expected but not found.
    #[error("not found")]
    NotFound,

    /// Stored data could not be converted into a domain type.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

impl RepositoryError {
    /// Map unique violations to `Conflict`, everything else to `Database`.
    pub(crate) fn from_unique(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(options: PgConnectOptions) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Clamp pagination input to `1..=100` rows per page.
#[must_use]
pub fn page_bounds(page: Option<u32>, per_page: Option<u32>) -> (i64, i64) {
    let per_page = per_page.unwrap_or(20).clamp(1, 100);
    let page = page.unwrap_or(1).max(1);
    let offset = i64::from(page - 1) * i64::from(per_page);
    (i64::from(per_page), offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds_defaults() {
        assert_eq!(page_bounds(None, None), (20, 0));
    }

    #[test]
    fn test_page_bounds_clamps() {
        assert_eq!(page_bounds(Some(0), Some(0)), (1, 0));
        assert_eq!(page_bounds(Some(3), Some(500)), (100, 200));
    }
}
