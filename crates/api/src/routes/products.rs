//! Catalog route handlers.
//!
//! Reads are public; inactive products are only visible to admins. Writes
//! are admin-only and deactivation is soft.

use axum::extract::State;
use serde::Deserialize;
use url::Url;

use la_artesa_core::{Money, ProductId, ProductImageId};

use super::{ApiJson, ApiPath, ApiQuery, required, trimmed};
use crate::db::{self, products};
use crate::error::AppError;
use crate::middleware::{OptionalAuth, RequireAdmin};
use crate::models::{Product, ProductImage, ProductWithImages};
use crate::response::ApiResponse;
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    pub page: Option<u32>,
    #[serde(alias = "per_page")]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub sap_code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub unit: String,
    pub price: Money,
    #[serde(default)]
    pub stock: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub price: Option<Money>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AddImageRequest {
    pub url: String,
    pub position: Option<i32>,
}

// =============================================================================
// Validation
// =============================================================================

fn check_stock(stock: i32) -> Result<i32, AppError> {
    if stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".to_owned()));
    }
    Ok(stock)
}

/// Build a partial update, rejecting blank names and negative stock.
fn changes_from(body: UpdateProductRequest) -> Result<products::ProductChanges, AppError> {
    let name = match body.name {
        Some(name) => Some(required(&name, "name")?),
        None => None,
    };
    let category = match body.category {
        Some(category) => Some(required(&category, "category")?),
        None => None,
    };
    let unit = match body.unit {
        Some(unit) => Some(required(&unit, "unit")?),
        None => None,
    };

    Ok(products::ProductChanges {
        name,
        description: body.description.map(|d| d.trim().to_owned()),
        category,
        unit,
        price: body.price,
        stock: body.stock.map(check_stock).transpose()?,
        is_active: body.is_active,
    })
}

/// Only absolute http(s) URLs are stored.
fn check_image_url(raw: &str) -> Result<String, AppError> {
    let url = Url::parse(raw.trim())
        .map_err(|_| AppError::BadRequest("url must be an absolute URL".to_owned()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::BadRequest("url must use http or https".to_owned()));
    }
    Ok(url.into())
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn list(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<ApiResponse<Vec<Product>>, AppError> {
    let is_admin = user.as_ref().is_some_and(|u| u.is_admin());
    let (limit, offset) = db::page_bounds(query.page, query.per_page);

    let filter = products::ProductFilter {
        category: trimmed(query.category),
        search: trimmed(query.search),
        include_inactive: query.include_inactive && is_admin,
        limit,
        offset,
    };

    Ok(ApiResponse::ok(products::list(state.pool(), &filter).await?))
}

pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<ApiResponse<ProductWithImages>, AppError> {
    let is_admin = user.as_ref().is_some_and(|u| u.is_admin());
    let product = products::get(state.pool(), id)
        .await?
        .filter(|p| p.is_active || is_admin)
        .ok_or_else(|| AppError::NotFound("Product".to_owned()))?;
    let images = products::images(state.pool(), id).await?;

    Ok(ApiResponse::ok(ProductWithImages { product, images }))
}

pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(body): ApiJson<CreateProductRequest>,
) -> Result<ApiResponse<Product>, AppError> {
    let new = products::NewProduct {
        sap_code: trimmed(body.sap_code),
        name: required(&body.name, "name")?,
        description: body.description.trim().to_owned(),
        category: required(&body.category, "category")?,
        unit: required(&body.unit, "unit")?,
        price: body.price,
        stock: check_stock(body.stock)?,
    };

    let product = products::create(state.pool(), &new).await?;
    tracing::info!(product_id = %product.id, admin_id = %admin.id, "Product created");
    Ok(ApiResponse::created(product))
}

pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<UpdateProductRequest>,
) -> Result<ApiResponse<Product>, AppError> {
    let changes = changes_from(body)?;
    let product = products::update(state.pool(), id, &changes).await?;
    Ok(ApiResponse::ok(product))
}

/// Soft delete: the product disappears from the catalog but old orders
/// keep pointing at it.
pub async fn deactivate(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<ApiResponse<()>, AppError> {
    products::deactivate(state.pool(), id).await?;
    tracing::info!(product_id = %id, admin_id = %admin.id, "Product deactivated");
    Ok(ApiResponse::message("Product deactivated"))
}

pub async fn add_image(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<AddImageRequest>,
) -> Result<ApiResponse<ProductImage>, AppError> {
    let url = check_image_url(&body.url)?;
    if body.position.is_some_and(|p| p < 0) {
        return Err(AppError::BadRequest("position cannot be negative".to_owned()));
    }
    let image = products::add_image(state.pool(), id, &url, body.position).await?;
    Ok(ApiResponse::created(image))
}

pub async fn delete_image(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath((id, image_id)): ApiPath<(ProductId, ProductImageId)>,
) -> Result<ApiResponse<()>, AppError> {
    products::delete_image(state.pool(), id, image_id).await?;
    Ok(ApiResponse::message("Image removed"))
}

pub async fn set_primary_image(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath((id, image_id)): ApiPath<(ProductId, ProductImageId)>,
) -> Result<ApiResponse<Vec<ProductImage>>, AppError> {
    products::set_primary_image(state.pool(), id, image_id).await?;
    Ok(ApiResponse::ok(products::images(state.pool(), id).await?))
}
