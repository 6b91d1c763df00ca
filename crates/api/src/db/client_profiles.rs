//! Client profile and document database operations.

use sqlx::{PgPool, Postgres, QueryBuilder};

use la_artesa_core::{ClientDocumentId, ClientProfileId, DocumentKind, Money, UserId};

use super::RepositoryError;
use crate::models::{ClientDocument, ClientProfile};

const PROFILE_COLUMNS: &str = "id, user_id, business_name, tax_id, contact_name, contact_phone, \
                               contact_email, address, city, department, sap_card_code, \
                               credit_limit, payment_terms_days, is_approved, created_at, updated_at";

/// Unique constraint on `client_profiles.tax_id`.
const TAX_ID_KEY: &str = "client_profiles_tax_id_key";

/// `Conflict` message when another profile already holds the tax ID.
pub const TAX_ID_CONFLICT: &str = "tax ID already exists";

const DOCUMENT_COLUMNS: &str =
    "id, client_profile_id, kind, file_name, storage_key, content_type, size_bytes, created_at";

/// Business fields supplied by the profile wizard.
#[derive(Debug, Clone)]
pub struct ProfileFields {
    pub business_name: String,
    pub tax_id: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub address: String,
    pub city: String,
    pub department: String,
}

/// Partial profile update; `None` leaves a column unchanged.
#[derive(Debug, Default, Clone)]
pub struct ProfileChanges {
    pub business_name: Option<String>,
    pub tax_id: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub department: Option<String>,
}

impl ProfileChanges {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.business_name.is_none()
            && self.tax_id.is_none()
            && self.contact_name.is_none()
            && self.contact_phone.is_none()
            && self.contact_email.is_none()
            && self.address.is_none()
            && self.city.is_none()
            && self.department.is_none()
    }
}

/// Commercial terms imported from a SAP business partner.
#[derive(Debug, Clone)]
pub struct SapTerms {
    pub card_code: String,
    pub credit_limit: Money,
    pub payment_terms_days: i32,
}

/// Create the profile of a user.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the user already has a profile or
/// the tax ID is registered to another client.
pub async fn create(
    pool: &PgPool,
    user_id: UserId,
    fields: &ProfileFields,
) -> Result<ClientProfile, RepositoryError> {
    sqlx::query_as::<_, ClientProfile>(&format!(
        r"
        INSERT INTO client_profiles (
            user_id, business_name, tax_id, contact_name, contact_phone,
            contact_email, address, city, department
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {PROFILE_COLUMNS}
        "
    ))
    .bind(user_id)
    .bind(&fields.business_name)
    .bind(&fields.tax_id)
    .bind(&fields.contact_name)
    .bind(&fields.contact_phone)
    .bind(&fields.contact_email)
    .bind(&fields.address)
    .bind(&fields.city)
    .bind(&fields.department)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        let subject = conflict_subject(match &e {
            sqlx::Error::Database(db_err) => db_err.constraint(),
            _ => None,
        });
        RepositoryError::from_unique(e, subject)
    })
}

/// What a unique violation on insert collided with.
fn conflict_subject(constraint: Option<&str>) -> &'static str {
    if constraint == Some(TAX_ID_KEY) {
        "tax ID"
    } else {
        "client profile"
    }
}

/// Get a profile by ID.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get(
    pool: &PgPool,
    id: ClientProfileId,
) -> Result<Option<ClientProfile>, RepositoryError> {
    let profile = sqlx::query_as::<_, ClientProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM client_profiles WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

/// Get the profile owned by a user.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_by_user(
    pool: &PgPool,
    user_id: UserId,
) -> Result<Option<ClientProfile>, RepositoryError> {
    let profile = sqlx::query_as::<_, ClientProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM client_profiles WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

/// List profiles, optionally only approved or pending ones.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list(
    pool: &PgPool,
    approved: Option<bool>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ClientProfile>, RepositoryError> {
    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new(format!("SELECT {PROFILE_COLUMNS} FROM client_profiles"));
    if let Some(approved) = approved {
        qb.push(" WHERE is_approved = ").push_bind(approved);
    }
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let profiles = qb.build_query_as::<ClientProfile>().fetch_all(pool).await?;
    Ok(profiles)
}

/// Apply a partial update. When `reset_approval` is set the profile goes
/// back to review.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the profile does not exist and
/// `RepositoryError::Conflict` if the new tax ID is taken.
pub async fn update(
    pool: &PgPool,
    id: ClientProfileId,
    changes: &ProfileChanges,
    reset_approval: bool,
) -> Result<ClientProfile, RepositoryError> {
    sqlx::query_as::<_, ClientProfile>(&format!(
        r"
        UPDATE client_profiles SET
            business_name = COALESCE($2, business_name),
            tax_id = COALESCE($3, tax_id),
            contact_name = COALESCE($4, contact_name),
            contact_phone = COALESCE($5, contact_phone),
            contact_email = COALESCE($6, contact_email),
            address = COALESCE($7, address),
            city = COALESCE($8, city),
            department = COALESCE($9, department),
            is_approved = CASE WHEN $10 THEN FALSE ELSE is_approved END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {PROFILE_COLUMNS}
        "
    ))
    .bind(id)
    .bind(&changes.business_name)
    .bind(&changes.tax_id)
    .bind(&changes.contact_name)
    .bind(&changes.contact_phone)
    .bind(&changes.contact_email)
    .bind(&changes.address)
    .bind(&changes.city)
    .bind(&changes.department)
    .bind(reset_approval)
    .fetch_optional(pool)
    .await
    .map_err(|e| RepositoryError::from_unique(e, "tax ID"))?
    .ok_or(RepositoryError::NotFound)
}

/// Approve or revoke approval of a profile.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the profile does not exist.
pub async fn set_approved(
    pool: &PgPool,
    id: ClientProfileId,
    approved: bool,
) -> Result<ClientProfile, RepositoryError> {
    sqlx::query_as::<_, ClientProfile>(&format!(
        r"
        UPDATE client_profiles SET is_approved = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING {PROFILE_COLUMNS}
        "
    ))
    .bind(id)
    .bind(approved)
    .fetch_optional(pool)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Delete a profile. Fails with a conflict while orders reference it.
///
/// Returns the storage keys of the deleted documents so their files can be
/// removed.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the profile does not exist and
/// `RepositoryError::Conflict` if orders still reference it.
pub async fn delete(pool: &PgPool, id: ClientProfileId) -> Result<Vec<String>, RepositoryError> {
    let mut tx = pool.begin().await?;

    let keys: Vec<String> =
        sqlx::query_scalar("SELECT storage_key FROM client_documents WHERE client_profile_id = $1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

    let result = sqlx::query("DELETE FROM client_profiles WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::Conflict("client has orders".to_owned());
            }
            RepositoryError::Database(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }

    tx.commit().await?;
    Ok(keys)
}

/// Apply SAP commercial terms to the profile with the given tax ID.
///
/// `tax_id` is compared against the stored NIT's digits before the check
/// digit, so `900123456-7` and `900.123.456` both match `900123456`.
/// Returns `false` when no profile has that tax ID.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the card code belongs to another profile.
pub async fn apply_sap_terms(
    pool: &PgPool,
    tax_id: &str,
    terms: &SapTerms,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE client_profiles SET
            sap_card_code = $2,
            credit_limit = $3,
            payment_terms_days = $4,
            updated_at = NOW()
        WHERE regexp_replace(split_part(tax_id, '-', 1), '[^0-9]', '', 'g') = $1
        ",
    )
    .bind(tax_id)
    .bind(&terms.card_code)
    .bind(terms.credit_limit)
    .bind(terms.payment_terms_days)
    .execute(pool)
    .await
    .map_err(|e| RepositoryError::from_unique(e, "SAP card code"))?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Documents
// =============================================================================

/// Metadata for a stored document.
pub struct NewDocument<'a> {
    pub kind: DocumentKind,
    pub file_name: &'a str,
    pub storage_key: &'a str,
    pub content_type: &'a str,
    pub size_bytes: i64,
}

/// Record an uploaded document.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn add_document(
    pool: &PgPool,
    profile_id: ClientProfileId,
    doc: NewDocument<'_>,
) -> Result<ClientDocument, RepositoryError> {
    let document = sqlx::query_as::<_, ClientDocument>(&format!(
        r"
        INSERT INTO client_documents
            (client_profile_id, kind, file_name, storage_key, content_type, size_bytes)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {DOCUMENT_COLUMNS}
        "
    ))
    .bind(profile_id)
    .bind(doc.kind)
    .bind(doc.file_name)
    .bind(doc.storage_key)
    .bind(doc.content_type)
    .bind(doc.size_bytes)
    .fetch_one(pool)
    .await?;

    Ok(document)
}

/// List documents of a profile, newest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn documents(
    pool: &PgPool,
    profile_id: ClientProfileId,
) -> Result<Vec<ClientDocument>, RepositoryError> {
    let docs = sqlx::query_as::<_, ClientDocument>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM client_documents WHERE client_profile_id = $1 ORDER BY created_at DESC"
    ))
    .bind(profile_id)
    .fetch_all(pool)
    .await?;

    Ok(docs)
}

/// Get one document of a profile.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn document(
    pool: &PgPool,
    profile_id: ClientProfileId,
    document_id: ClientDocumentId,
) -> Result<Option<ClientDocument>, RepositoryError> {
    let doc = sqlx::query_as::<_, ClientDocument>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM client_documents WHERE id = $1 AND client_profile_id = $2"
    ))
    .bind(document_id)
    .bind(profile_id)
    .fetch_optional(pool)
    .await?;

    Ok(doc)
}
