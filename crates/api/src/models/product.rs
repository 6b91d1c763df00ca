//! Catalog types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use la_artesa_core::{Money, ProductId, ProductImageId};

/// A product sold to wholesale clients.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    /// SAP `ItemCode`, present for products imported from SAP.
    pub sap_code: Option<String>,
    pub name: String,
    pub description: String,
    pub category: String,
    /// Sales unit, e.g. `und`, `kg`, `paquete x12`.
    pub unit: String,
    pub price: Money,
    pub stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An image attached to a product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage {
    pub id: ProductImageId,
    pub product_id: ProductId,
    pub url: String,
    pub position: i32,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// A product with its images, primary image first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductWithImages {
    #[serde(flatten)]
    pub product: Product,
    pub images: Vec<ProductImage>,
}
