//! Catalog database operations.

use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use la_artesa_core::{Money, ProductId, ProductImageId};

use super::RepositoryError;
use crate::models::{Product, ProductImage};

const PRODUCT_COLUMNS: &str = "id, sap_code, name, description, category, unit, price, stock, \
                               is_active, created_at, updated_at";

/// Filters for listing products.
#[derive(Debug, Default, Clone)]
pub struct ProductFilter {
    pub category: Option<String>,
    /// Case-insensitive substring of name or description.
    pub search: Option<String>,
    pub include_inactive: bool,
    pub limit: i64,
    pub offset: i64,
}

/// Fields for a new product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sap_code: Option<String>,
    pub name: String,
    pub description: String,
    pub category: String,
    pub unit: String,
    pub price: Money,
    pub stock: i32,
}

/// Partial product update; `None` leaves a column unchanged.
#[derive(Debug, Default, Clone)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub price: Option<Money>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
}

/// Escape `LIKE` wildcards in user input.
fn like_pattern(input: &str) -> String {
    let escaped = input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// List products matching a filter, ordered by category then name.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list(pool: &PgPool, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"));

    if !filter.include_inactive {
        qb.push(" AND is_active");
    }
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search.trim());
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    qb.push(" ORDER BY category, name LIMIT ")
        .push_bind(filter.limit)
        .push(" OFFSET ")
        .push_bind(filter.offset);

    let products = qb.build_query_as::<Product>().fetch_all(pool).await?;
    Ok(products)
}

/// Get a product by ID.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get(pool: &PgPool, id: ProductId) -> Result<Option<Product>, RepositoryError> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(product)
}

/// Lock and return the active products among `ids` for pricing an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_active_by_ids(
    conn: &mut PgConnection,
    ids: &[ProductId],
) -> Result<Vec<Product>, RepositoryError> {
    let raw: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
    let products = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) AND is_active FOR SHARE"
    ))
    .bind(raw)
    .fetch_all(conn)
    .await?;

    Ok(products)
}

/// Images of a product, primary first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn images(pool: &PgPool, id: ProductId) -> Result<Vec<ProductImage>, RepositoryError> {
    let images = sqlx::query_as::<_, ProductImage>(
        r"
        SELECT id, product_id, url, position, is_primary, created_at
        FROM product_images
        WHERE product_id = $1
        ORDER BY is_primary DESC, position, id
        ",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(images)
}

/// Create a product.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the SAP code is taken.
pub async fn create(pool: &PgPool, new: &NewProduct) -> Result<Product, RepositoryError> {
    sqlx::query_as::<_, Product>(&format!(
        r"
        INSERT INTO products (sap_code, name, description, category, unit, price, stock)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {PRODUCT_COLUMNS}
        "
    ))
    .bind(&new.sap_code)
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.category)
    .bind(&new.unit)
    .bind(new.price)
    .bind(new.stock)
    .fetch_one(pool)
    .await
    .map_err(|e| RepositoryError::from_unique(e, "SAP code"))
}

/// Apply a partial update.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the product does not exist.
pub async fn update(
    pool: &PgPool,
    id: ProductId,
    changes: &ProductChanges,
) -> Result<Product, RepositoryError> {
    sqlx::query_as::<_, Product>(&format!(
        r"
        UPDATE products SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            category = COALESCE($4, category),
            unit = COALESCE($5, unit),
            price = COALESCE($6, price),
            stock = COALESCE($7, stock),
            is_active = COALESCE($8, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {PRODUCT_COLUMNS}
        "
    ))
    .bind(id)
    .bind(&changes.name)
    .bind(&changes.description)
    .bind(&changes.category)
    .bind(&changes.unit)
    .bind(changes.price)
    .bind(changes.stock)
    .bind(changes.is_active)
    .fetch_optional(pool)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Soft-delete a product so existing orders keep their references.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the product does not exist.
pub async fn deactivate(pool: &PgPool, id: ProductId) -> Result<(), RepositoryError> {
    let result =
        sqlx::query("UPDATE products SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Attach an image. The first image of a product becomes its primary.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the product does not exist.
pub async fn add_image(
    pool: &PgPool,
    product_id: ProductId,
    url: &str,
    position: Option<i32>,
) -> Result<ProductImage, RepositoryError> {
    let mut tx = pool.begin().await?;

    // Lock the product so concurrent uploads agree on which image is first
    let locked: Option<ProductId> =
        sqlx::query_scalar("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
    if locked.is_none() {
        return Err(RepositoryError::NotFound);
    }

    let image = sqlx::query_as::<_, ProductImage>(
        r"
        INSERT INTO product_images (product_id, url, position, is_primary)
        SELECT $1, $2,
               COALESCE($3, (SELECT COALESCE(MAX(position) + 1, 0) FROM product_images WHERE product_id = $1)),
               NOT EXISTS (SELECT 1 FROM product_images WHERE product_id = $1)
        RETURNING id, product_id, url, position, is_primary, created_at
        ",
    )
    .bind(product_id)
    .bind(url)
    .bind(position)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(image)
}

/// Remove an image. If it was primary, the next image is promoted.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the image does not belong to the product.
pub async fn delete_image(
    pool: &PgPool,
    product_id: ProductId,
    image_id: ProductImageId,
) -> Result<(), RepositoryError> {
    let mut tx = pool.begin().await?;

    let was_primary: Option<bool> = sqlx::query_scalar(
        "DELETE FROM product_images WHERE id = $1 AND product_id = $2 RETURNING is_primary",
    )
    .bind(image_id)
    .bind(product_id)
    .fetch_optional(&mut *tx)
    .await?;

    match was_primary {
        None => return Err(RepositoryError::NotFound),
        Some(true) => {
            sqlx::query(
                r"
                UPDATE product_images SET is_primary = TRUE
                WHERE id = (
                    SELECT id FROM product_images WHERE product_id = $1
                    ORDER BY position, id LIMIT 1
                )
                ",
            )
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        }
        Some(false) => {}
    }

    tx.commit().await?;
    Ok(())
}

/// Make one image the product's only primary image.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the image does not belong to the product.
pub async fn set_primary_image(
    pool: &PgPool,
    product_id: ProductId,
    image_id: ProductImageId,
) -> Result<(), RepositoryError> {
    let mut tx = pool.begin().await?;

    // Clear first: the partial unique index allows one primary per product
    sqlx::query("UPDATE product_images SET is_primary = FALSE WHERE product_id = $1 AND is_primary")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query(
        "UPDATE product_images SET is_primary = TRUE WHERE id = $1 AND product_id = $2",
    )
    .bind(image_id)
    .bind(product_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        // Dropping the transaction rolls back the cleared flag
        return Err(RepositoryError::NotFound);
    }

    tx.commit().await?;
    Ok(())
}

/// Outcome of an upsert keyed by SAP code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created,
    Updated,
}

/// Insert or update a product by its SAP code.
///
/// Name, category, unit, price, stock and active flag follow SAP; the
/// description and images stay as edited locally.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the statement fails.
pub async fn upsert_from_sap(
    pool: &PgPool,
    item: &NewProduct,
    active: bool,
) -> Result<Upserted, RepositoryError> {
    let inserted: bool = sqlx::query_scalar(
        r"
        INSERT INTO products (sap_code, name, description, category, unit, price, stock, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (sap_code) DO UPDATE SET
            name = EXCLUDED.name,
            category = EXCLUDED.category,
            unit = EXCLUDED.unit,
            price = EXCLUDED.price,
            stock = EXCLUDED.stock,
            is_active = EXCLUDED.is_active,
            updated_at = NOW()
        RETURNING (xmax = 0)
        ",
    )
    .bind(&item.sap_code)
    .bind(&item.name)
    .bind(&item.description)
    .bind(&item.category)
    .bind(&item.unit)
    .bind(item.price)
    .bind(item.stock)
    .bind(active)
    .fetch_one(pool)
    .await?;

    Ok(if inserted {
        Upserted::Created
    } else {
        Upserted::Updated
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("pan"), "%pan%");
        assert_eq!(like_pattern("100%_integral"), "%100\\%\\_integral%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
