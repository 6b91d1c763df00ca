//! Wholesale client onboarding types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use la_artesa_core::{ClientDocumentId, ClientProfileId, DocumentKind, Money, UserId};

/// Business data a client fills in through the profile wizard.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    pub id: ClientProfileId,
    pub user_id: UserId,
    pub business_name: String,
    /// NIT, matched against SAP `FederalTaxID`.
    pub tax_id: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub address: String,
    pub city: String,
    pub department: String,
    pub sap_card_code: Option<String>,
    pub credit_limit: Money,
    pub payment_terms_days: i32,
    /// Only approved clients can place orders.
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata of an uploaded client document.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClientDocument {
    pub id: ClientDocumentId,
    pub client_profile_id: ClientProfileId,
    pub kind: DocumentKind,
    pub file_name: String,
    /// Path relative to the upload directory.
    #[serde(skip)]
    pub storage_key: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}
