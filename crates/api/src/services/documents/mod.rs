//! Client document storage.
//!
//! Documents are keyed `<profile id>/<uuid>-<sanitized name>`; the key is
//! kept in `client_documents`. Production stores them in an S3 bucket under
//! that key, development under `UPLOAD_DIR`. Content type is decided from
//! the leading bytes, never from what the browser claims.

mod local;
mod s3;

pub use local::LocalDocuments;
pub use s3::S3Documents;

use std::path::{Component, Path};

use thiserror::Error;
use uuid::Uuid;

use la_artesa_core::ClientProfileId;

use crate::config::DocumentStorageConfig;

/// Largest accepted document.
pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

const MAX_NAME_LENGTH: usize = 100;

/// Errors from document storage.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("file is empty")]
    Empty,

    #[error("file exceeds the 10 MiB limit")]
    TooLarge,

    #[error("only PDF, PNG and JPEG files are accepted")]
    UnsupportedType,

    #[error("invalid storage key")]
    InvalidKey,

    #[error("stored file is missing")]
    Missing,

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object storage error: {0}")]
    ObjectStore(String),
}

/// Reduce an uploaded file name to a safe basename.
///
/// Directory parts are dropped and anything outside `[A-Za-z0-9._-]` becomes
/// `_`. Leading dots are removed so the result is never hidden or relative.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        let keep = c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_');
        let c = if keep { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_start_matches('.').trim_matches('_');
    let mut result: String = trimmed.chars().take(MAX_NAME_LENGTH).collect();
    if result.is_empty() {
        result.push_str("document");
    }
    result
}

/// Detect an accepted content type from the file's leading bytes.
#[must_use]
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF-") {
        Some("application/pdf")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else {
        None
    }
}

/// Check size and type of an upload, returning its content type.
///
/// # Errors
///
/// Returns `DocumentError::Empty`, `DocumentError::TooLarge` or
/// `DocumentError::UnsupportedType`.
pub fn check_upload(bytes: &[u8]) -> Result<&'static str, DocumentError> {
    if bytes.is_empty() {
        return Err(DocumentError::Empty);
    }
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(DocumentError::TooLarge);
    }
    sniff_content_type(bytes).ok_or(DocumentError::UnsupportedType)
}

/// Build the storage key for a new file.
#[must_use]
pub fn storage_key(profile_id: ClientProfileId, file_name: &str) -> String {
    format!(
        "{profile_id}/{}-{}",
        Uuid::new_v4(),
        sanitize_file_name(file_name)
    )
}

/// Check that a storage key is a relative path with no `.`/`..` parts.
///
/// # Errors
///
/// Returns `DocumentError::InvalidKey` otherwise.
pub fn check_key(key: &str) -> Result<&Path, DocumentError> {
    let relative = Path::new(key);
    let normal = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if key.is_empty() || !normal {
        return Err(DocumentError::InvalidKey);
    }
    Ok(relative)
}

/// Where client documents are kept.
#[derive(Debug, Clone)]
pub enum DocumentStore {
    /// Files under a local directory.
    Local(LocalDocuments),
    /// Objects in an S3 bucket.
    S3(S3Documents),
}

impl DocumentStore {
    /// Build the backend selected by configuration.
    pub async fn from_config(config: &DocumentStorageConfig) -> Self {
        match config {
            DocumentStorageConfig::Local { dir } => Self::Local(LocalDocuments::new(dir.clone())),
            DocumentStorageConfig::S3 {
                bucket,
                region,
                endpoint,
            } => Self::S3(
                S3Documents::connect(bucket.clone(), region.as_deref(), endpoint.as_deref()).await,
            ),
        }
    }

    /// Store a new upload and return its storage key.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Io` or `DocumentError::ObjectStore` if the
    /// write fails.
    pub async fn save(
        &self,
        profile_id: ClientProfileId,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<String, DocumentError> {
        let key = storage_key(profile_id, file_name);
        match self {
            Self::Local(local) => local.write(&key, bytes).await?,
            Self::S3(s3) => s3.put(&key, content_type, bytes).await?,
        }
        tracing::debug!(key = %key, size = bytes.len(), "Stored client document");
        Ok(key)
    }

    /// Read a stored document.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Missing` if it is gone.
    pub async fn read(&self, key: &str) -> Result<Vec<u8>, DocumentError> {
        match self {
            Self::Local(local) => local.read(key).await,
            Self::S3(s3) => s3.get(key).await,
        }
    }

    /// Delete a stored document. Missing documents are ignored.
    ///
    /// # Errors
    ///
    /// Returns the backend error for anything else.
    pub async fn remove(&self, key: &str) -> Result<(), DocumentError> {
        match self {
            Self::Local(local) => local.remove(key).await,
            Self::S3(s3) => s3.delete(key).await,
        }
    }
}
