//! Domain models for the API.
//!
//! Row types derive `sqlx::FromRow` and are serialized to camelCase JSON for
//! the frontend. Secrets (password hashes, token hashes) never derive
//! `Serialize`.

pub mod client_profile;
pub mod order;
pub mod product;
pub mod session;
pub mod settings;
pub mod sync;
pub mod user;

pub use client_profile::{ClientDocument, ClientProfile};
pub use order::{Order, OrderDetail, OrderWithDetails, Payment};
pub use product::{Product, ProductImage, ProductWithImages};
pub use session::{CurrentUser, keys as session_keys};
pub use settings::{SettingKey, Settings};
pub use sync::SyncRun;
pub use user::User;
