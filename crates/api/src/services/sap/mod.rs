//! SAP Business One Service Layer integration.
//!
//! # Architecture
//!
//! - `client` - Session-cookie client for the Service Layer REST API
//! - `sync` - Product and client imports recorded in `sap_sync_runs`
//!
//! The integration is optional: without `SAP_*` settings the sync endpoints
//! answer `503` and the rest of the API works normally.

pub mod client;
pub mod sync;

pub use client::SapClient;
pub use sync::{SyncReport, run_sync, spawn_sync};

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur when talking to SAP or recording a sync.
#[derive(Debug, Error)]
pub enum SapError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// `/Login` rejected the configured credentials.
    #[error("SAP login failed ({status}): {message}")]
    Login { status: u16, message: String },

    /// Service Layer returned an error response.
    #[error("SAP API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A sync of the same kind is already running.
    #[error("a sync of this kind is already running")]
    SyncInProgress,

    /// Database error while applying or recording a sync.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
