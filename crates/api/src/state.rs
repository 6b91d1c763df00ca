//! Application state shared across handlers.

use std::sync::Arc;

use lettre::transport::smtp::Error as SmtpError;
use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::services::{
    DocumentStore, EmailService, RecaptchaError, RecaptchaVerifier, SapClient, SapError,
};

/// Error building shared services at startup.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("email transport: {0}")]
    Email(#[from] SmtpError),
    #[error("reCAPTCHA client: {0}")]
    Recaptcha(#[from] RecaptchaError),
    #[error("SAP client: {0}")]
    Sap(#[from] SapError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    email: EmailService,
    recaptcha: RecaptchaVerifier,
    documents: DocumentStore,
    sap: Option<SapClient>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the outbound clients cannot be built.
    pub async fn new(config: ApiConfig, pool: PgPool) -> Result<Self, StateError> {
        let email = EmailService::new(&config.email)?;
        let recaptcha = RecaptchaVerifier::new(&config.recaptcha)?;
        let documents = DocumentStore::from_config(&config.documents).await;
        let sap = match &config.sap {
            Some(sap_config) => Some(SapClient::new(sap_config)?),
            None => {
                tracing::info!("SAP settings not present, SAP sync disabled");
                None
            }
        };

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                email,
                recaptcha,
                documents,
                sap,
            }),
        })
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    #[must_use]
    pub fn recaptcha(&self) -> &RecaptchaVerifier {
        &self.inner.recaptcha
    }

    /// Client document storage.
    #[must_use]
    pub fn documents(&self) -> &DocumentStore {
        &self.inner.documents
    }

    /// SAP client, when configured.
    #[must_use]
    pub fn sap(&self) -> Option<&SapClient> {
        self.inner.sap.as_ref()
    }
}
