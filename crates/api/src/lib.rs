//! La Artesa API library.
//!
//! JSON REST backend for the La Artesa wholesale bakery: accounts and
//! password reset, client onboarding, catalog, orders, payments, admin
//! settings and SAP Business One imports. Exposed as a library so the
//! binary, the CLI and the tests share one implementation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
