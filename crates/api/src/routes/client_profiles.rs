//! Client profile route handlers (onboarding wizard backend).
//!
//! A user owns at most one profile. Clients edit their own; admins review,
//! approve and delete. Supporting documents are uploaded as multipart and
//! streamed back with the content type detected at upload time.

use axum::{
    body::Body,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use la_artesa_core::{ClientDocumentId, ClientProfileId, DocumentKind, Email};

use super::{ApiJson, ApiPath, ApiQuery, required};
use crate::db::{self, client_profiles};
use crate::error::AppError;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{ClientDocument, ClientProfile, CurrentUser};
use crate::response::ApiResponse;
use crate::services::DocumentError;
use crate::services::documents::{check_upload, sanitize_file_name};
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileRequest {
    pub business_name: String,
    pub tax_id: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub address: String,
    pub city: String,
    pub department: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub business_name: Option<String>,
    pub tax_id: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub approved: Option<bool>,
    pub page: Option<u32>,
    #[serde(alias = "per_page")]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub approved: bool,
}

/// A profile with its uploaded documents.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDetail {
    #[serde(flatten)]
    pub profile: ClientProfile,
    pub documents: Vec<ClientDocument>,
}

// =============================================================================
// Validation
// =============================================================================

fn check_email(raw: &str) -> Result<String, AppError> {
    Email::parse(raw)
        .map(Email::into_inner)
        .map_err(|e| AppError::BadRequest(format!("contactEmail: {e}")))
}

fn check_tax_id(raw: &str) -> Result<String, AppError> {
    let tax_id = required(raw, "taxId")?;
    if !tax_id.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest("taxId must contain digits".to_owned()));
    }
    Ok(tax_id)
}

fn fields_from(body: CreateProfileRequest) -> Result<client_profiles::ProfileFields, AppError> {
    Ok(client_profiles::ProfileFields {
        business_name: required(&body.business_name, "businessName")?,
        tax_id: check_tax_id(&body.tax_id)?,
        contact_name: required(&body.contact_name, "contactName")?,
        contact_phone: required(&body.contact_phone, "contactPhone")?,
        contact_email: check_email(&body.contact_email)?,
        address: required(&body.address, "address")?,
        city: required(&body.city, "city")?,
        department: required(&body.department, "department")?,
    })
}

fn changes_from(body: UpdateProfileRequest) -> Result<client_profiles::ProfileChanges, AppError> {
    let text = |value: Option<String>, field: &str| -> Result<Option<String>, AppError> {
        value.map(|v| required(&v, field)).transpose()
    };

    Ok(client_profiles::ProfileChanges {
        business_name: text(body.business_name, "businessName")?,
        tax_id: body.tax_id.as_deref().map(check_tax_id).transpose()?,
        contact_name: text(body.contact_name, "contactName")?,
        contact_phone: text(body.contact_phone, "contactPhone")?,
        contact_email: body.contact_email.as_deref().map(check_email).transpose()?,
        address: text(body.address, "address")?,
        city: text(body.city, "city")?,
        department: text(body.department, "department")?,
    })
}

/// Load a profile the user may see. Other clients' profiles look missing.
async fn visible_profile(
    state: &AppState,
    user: &CurrentUser,
    id: ClientProfileId,
) -> Result<ClientProfile, AppError> {
    client_profiles::get(state.pool(), id)
        .await?
        .filter(|p| user.is_admin() || p.user_id == user.id)
        .ok_or_else(|| AppError::NotFound("Client profile".to_owned()))
}

async fn own_profile(state: &AppState, user: &CurrentUser) -> Result<ClientProfile, AppError> {
    client_profiles::get_by_user(state.pool(), user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Client profile".to_owned()))
}

// =============================================================================
// Profile Handlers
// =============================================================================

pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<CreateProfileRequest>,
) -> Result<ApiResponse<ClientProfile>, AppError> {
    if client_profiles::get_by_user(state.pool(), user.id)
        .await?
        .is_some()
    {
        return Err(AppError::ProfileExists);
    }

    let fields = fields_from(body)?;
    let profile = client_profiles::create(state.pool(), user.id, &fields)
        .await
        .map_err(|e| match conflict_error(e) {
            AppError::Database(db::RepositoryError::Conflict(_)) => AppError::ProfileExists,
            other => other,
        })?;

    tracing::info!(profile_id = %profile.id, user_id = %user.id, "Client profile created");
    Ok(ApiResponse::created(profile))
}

/// A tax ID held by another profile gets its own error code.
fn conflict_error(err: db::RepositoryError) -> AppError {
    match err {
        db::RepositoryError::Conflict(msg) if msg == client_profiles::TAX_ID_CONFLICT => {
            AppError::TaxIdTaken
        }
        other => other.into(),
    }
}

pub async fn show_mine(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<ProfileDetail>, AppError> {
    let profile = own_profile(&state, &user).await?;
    let documents = client_profiles::documents(state.pool(), profile.id).await?;
    Ok(ApiResponse::ok(ProfileDetail { profile, documents }))
}

/// Edit the caller's profile. A client edit sends it back for approval.
pub async fn update_mine(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<UpdateProfileRequest>,
) -> Result<ApiResponse<ClientProfile>, AppError> {
    let profile = own_profile(&state, &user).await?;
    let changes = changes_from(body)?;
    if changes.is_empty() {
        return Ok(ApiResponse::ok(profile));
    }

    let updated = client_profiles::update(state.pool(), profile.id, &changes, !user.is_admin())
        .await
        .map_err(conflict_error)?;
    Ok(ApiResponse::ok(updated))
}

pub async fn list(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<ApiResponse<Vec<ClientProfile>>, AppError> {
    let (limit, offset) = db::page_bounds(query.page, query.per_page);
    let profiles = client_profiles::list(state.pool(), query.approved, limit, offset).await?;
    Ok(ApiResponse::ok(profiles))
}

pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath(id): ApiPath<ClientProfileId>,
) -> Result<ApiResponse<ProfileDetail>, AppError> {
    let profile = client_profiles::get(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::NotFound("Client profile".to_owned()))?;
    let documents = client_profiles::documents(state.pool(), id).await?;
    Ok(ApiResponse::ok(ProfileDetail { profile, documents }))
}

pub async fn set_approval(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ClientProfileId>,
    ApiJson(body): ApiJson<ApprovalRequest>,
) -> Result<ApiResponse<ClientProfile>, AppError> {
    let profile = client_profiles::set_approved(state.pool(), id, body.approved).await?;
    tracing::info!(
        profile_id = %id,
        admin_id = %admin.id,
        approved = body.approved,
        "Client profile approval changed"
    );
    Ok(ApiResponse::ok(profile))
}

/// Delete a profile and its stored files.
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ClientProfileId>,
) -> Result<ApiResponse<()>, AppError> {
    let keys = client_profiles::delete(state.pool(), id).await?;

    for key in &keys {
        if let Err(e) = state.documents().remove(key).await {
            tracing::warn!(key = %key, error = %e, "Failed to remove client document file");
        }
    }

    tracing::info!(profile_id = %id, admin_id = %admin.id, files = keys.len(), "Client profile deleted");
    Ok(ApiResponse::message("Client profile deleted"))
}

// =============================================================================
// Document Handlers
// =============================================================================

fn multipart_error(e: &MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        DocumentError::TooLarge.into()
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// The `kind` and `file` parts of an upload.
struct Upload {
    kind: DocumentKind,
    file_name: String,
    bytes: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    let mut kind = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(&e))? {
        match field.name() {
            Some("kind") => {
                let text = field.text().await.map_err(|e| multipart_error(&e))?;
                let parsed = text
                    .trim()
                    .parse::<DocumentKind>()
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                kind = Some(parsed);
            }
            Some("file") => {
                let name = sanitize_file_name(field.file_name().unwrap_or_default());
                let bytes = field.bytes().await.map_err(|e| multipart_error(&e))?;
                file = Some((name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let kind = kind.ok_or_else(|| AppError::BadRequest("kind is required".to_owned()))?;
    let (file_name, bytes) =
        file.ok_or_else(|| AppError::BadRequest("file is required".to_owned()))?;
    Ok(Upload {
        kind,
        file_name,
        bytes,
    })
}

pub async fn upload_document(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<ClientProfileId>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<ClientDocument>, AppError> {
    let profile = visible_profile(&state, &user, id).await?;
    let multipart = multipart.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let upload = read_upload(multipart).await?;
    let content_type = check_upload(&upload.bytes)?;

    let key = state
        .documents()
        .save(profile.id, &upload.file_name, content_type, &upload.bytes)
        .await?;

    let size_bytes = i64::try_from(upload.bytes.len()).unwrap_or(i64::MAX);
    let record = client_profiles::add_document(
        state.pool(),
        profile.id,
        client_profiles::NewDocument {
            kind: upload.kind,
            file_name: &upload.file_name,
            storage_key: &key,
            content_type,
            size_bytes,
        },
    )
    .await;

    let document = match record {
        Ok(document) => document,
        Err(e) => {
            if let Err(remove_err) = state.documents().remove(&key).await {
                tracing::warn!(key = %key, error = %remove_err, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        profile_id = %profile.id,
        document_id = %document.id,
        kind = %document.kind,
        size = size_bytes,
        "Client document uploaded"
    );
    Ok(ApiResponse::created(document))
}

pub async fn list_documents(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<ClientProfileId>,
) -> Result<ApiResponse<Vec<ClientDocument>>, AppError> {
    let profile = visible_profile(&state, &user, id).await?;
    let documents = client_profiles::documents(state.pool(), profile.id).await?;
    Ok(ApiResponse::ok(documents))
}

/// `Content-Disposition` value for a stored (already sanitized) name.
fn attachment_header(file_name: &str) -> String {
    format!("attachment; filename=\"{}\"", sanitize_file_name(file_name))
}

pub async fn download_document(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath((id, doc_id)): ApiPath<(ClientProfileId, ClientDocumentId)>,
) -> Result<Response, AppError> {
    let profile = visible_profile(&state, &user, id).await?;
    let document = client_profiles::document(state.pool(), profile.id, doc_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Document".to_owned()))?;

    let bytes = state.documents().read(&document.storage_key).await?;

    Ok((
        [
            (header::CONTENT_TYPE, document.content_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                attachment_header(&document.file_name),
            ),
            (header::CACHE_CONTROL, "private, no-store".to_owned()),
        ],
        Body::from(bytes),
    )
        .into_response())
}
