//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DB_HOST`, `DB_USER`, `DB_PASSWORD`, `DB_DATABASE` - `PostgreSQL` connection
//!   parts (not needed when `DATABASE_URL` is set)
//! - `FRONTEND_URL` - Public URL of the single-page frontend (reset links, CORS)
//! - `SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `SMTP_HOST`, `SMTP_USER`, `SMTP_PASSWORD`, `SMTP_FROM` - Outgoing mail
//!
//! ## Optional
//! - `DATABASE_URL` - Full connection string, overrides the `DB_*` parts
//! - `DB_PORT` - Database port (default: 5432)
//! - `DB_SSL` - Require TLS to the database (default: false)
//! - `API_HOST` - Bind address (default: 127.0.0.1)
//! - `API_PORT` - Listen port (default: 5000)
//! - `SMTP_PORT` - SMTP submission port (default: 587)
//! - `RECAPTCHA_SECRET_KEY` - reCAPTCHA secret; verification is skipped when unset
//! - `RECAPTCHA_MIN_SCORE` - Minimum v3 score (default: 0.5)
//! - `RECAPTCHA_VERIFY_URL` - Verification endpoint (default: Google siteverify)
//! - `SAP_SERVICE_URL`, `SAP_COMPANY_DB`, `SAP_USERNAME`, `SAP_PASSWORD` -
//!   SAP Business One Service Layer; SAP sync is disabled unless all are set
//! - `SAP_PRICE_LIST` - Price list number used for product prices (default: 1)
//! - `DOCUMENT_STORAGE` - `s3` or `local` (default: local)
//! - `S3_BUCKET` - Bucket for client documents (required when `DOCUMENT_STORAGE=s3`)
//! - `S3_REGION` - Bucket region (default: from the AWS environment)
//! - `S3_ENDPOINT` - S3-compatible endpoint such as `MinIO`
//! - `UPLOAD_DIR` - Directory for client documents with local storage (default: uploads)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT` - Sentry error tracking
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Performance sample rate (default: 0.1)
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Google's reCAPTCHA verification endpoint.
pub const DEFAULT_RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "insert",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// How to reach `PostgreSQL`
    pub database: DatabaseConfig,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public URL of the frontend, without trailing slash
    pub frontend_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Outgoing mail
    pub email: EmailConfig,
    /// Bot protection for public forms
    pub recaptcha: RecaptchaConfig,
    /// SAP Service Layer, when configured
    pub sap: Option<SapConfig>,
    /// Where uploaded client documents are kept
    pub documents: DocumentStorageConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// Emit JSON log lines instead of human-readable text
    pub log_json: bool,
}

/// Database connection settings.
#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    /// A complete connection string (`DATABASE_URL`).
    Url(SecretString),
    /// Individual connection parts (`DB_*`).
    Parts {
        host: String,
        port: u16,
        user: String,
        password: SecretString,
        database: String,
        ssl: bool,
    },
}

/// SMTP settings for transactional mail.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    /// `From:` header, e.g. `La Artesa <no-reply@laartesa.co>`
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// reCAPTCHA verification settings.
#[derive(Clone)]
pub struct RecaptchaConfig {
    /// Server-side secret; `None` disables verification.
    pub secret_key: Option<SecretString>,
    /// Lowest acceptable v3 score.
    pub min_score: f64,
    pub verify_url: String,
}

impl std::fmt::Debug for RecaptchaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecaptchaConfig")
            .field(
                "secret_key",
                &self.secret_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("min_score", &self.min_score)
            .field("verify_url", &self.verify_url)
            .finish()
    }
}

/// SAP Business One Service Layer settings.
#[derive(Clone)]
pub struct SapConfig {
    /// Base URL, e.g. `https://sap.example.co:50000/b1s/v1`
    pub service_url: String,
    pub company_db: String,
    pub username: String,
    pub password: SecretString,
    /// Price list whose prices become product prices.
    pub price_list: i32,
}

impl std::fmt::Debug for SapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SapConfig")
            .field("service_url", &self.service_url)
            .field("company_db", &self.company_db)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("price_list", &self.price_list)
            .finish()
    }
}

/// Client document storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStorageConfig {
    /// Files under a local directory.
    Local { dir: PathBuf },
    /// Objects in an S3 bucket.
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
    },
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig::from_env()?;
        let host = parse_env("API_HOST", "127.0.0.1")?;
        let port = parse_env("API_PORT", "5000")?;
        let frontend_url = get_required_env("FRONTEND_URL")?
            .trim_end_matches('/')
            .to_owned();
        url::Url::parse(&frontend_url)
            .map_err(|e| ConfigError::InvalidEnvVar("FRONTEND_URL".to_owned(), e.to_string()))?;

        let session_secret = get_validated_secret("SESSION_SECRET")?;
        validate_session_secret(&session_secret, "SESSION_SECRET")?;

        Ok(Self {
            database,
            host,
            port,
            frontend_url,
            session_secret,
            email: EmailConfig::from_env()?,
            recaptcha: RecaptchaConfig::from_env()?,
            sap: SapConfig::from_env()?,
            documents: DocumentStorageConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
            log_json: get_env_or_default("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the frontend is served over HTTPS (controls `Secure` cookies).
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.frontend_url.starts_with("https://")
    }
}

impl DatabaseConfig {
    /// Load database settings, preferring `DATABASE_URL` when present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if neither form is complete or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Some(url) = get_optional_env("DATABASE_URL") {
            return Ok(Self::Url(SecretString::from(url)));
        }

        Ok(Self::Parts {
            host: get_required_env("DB_HOST")?,
            port: parse_env("DB_PORT", "5432")?,
            user: get_required_env("DB_USER")?,
            password: SecretString::from(get_required_env("DB_PASSWORD")?),
            database: get_required_env("DB_DATABASE")?,
            ssl: parse_bool("DB_SSL", &get_env_or_default("DB_SSL", "false"))?,
        })
    }

    /// Build sqlx connect options.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `DATABASE_URL` cannot be parsed.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        match self {
            Self::Url(url) => url
                .expose_secret()
                .parse::<PgConnectOptions>()
                .map_err(|e| ConfigError::InvalidEnvVar("DATABASE_URL".to_owned(), e.to_string())),
            Self::Parts {
                host,
                port,
                user,
                password,
                database,
                ssl,
            } => Ok(PgConnectOptions::new()
                .host(host)
                .port(*port)
                .username(user)
                .password(password.expose_secret())
                .database(database)
                .ssl_mode(if *ssl {
                    PgSslMode::Require
                } else {
                    PgSslMode::Prefer
                })),
        }
    }
}

impl EmailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            smtp_host: get_required_env("SMTP_HOST")?,
            smtp_port: parse_env("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USER")?,
            smtp_password: SecretString::from(get_required_env("SMTP_PASSWORD")?),
            from_address: get_required_env("SMTP_FROM")?,
        })
    }
}

impl RecaptchaConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let min_score: f64 = parse_env("RECAPTCHA_MIN_SCORE", "0.5")?;
        if !(0.0..=1.0).contains(&min_score) {
            return Err(ConfigError::InvalidEnvVar(
                "RECAPTCHA_MIN_SCORE".to_owned(),
                "must be between 0.0 and 1.0".to_owned(),
            ));
        }

        Ok(Self {
            secret_key: get_optional_env("RECAPTCHA_SECRET_KEY").map(SecretString::from),
            min_score,
            verify_url: get_env_or_default("RECAPTCHA_VERIFY_URL", DEFAULT_RECAPTCHA_VERIFY_URL),
        })
    }
}

impl SapConfig {
    /// Load SAP settings; `None` unless every required variable is set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the settings are only partially present or
    /// `SAP_PRICE_LIST` is not a number.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let keys = ["SAP_SERVICE_URL", "SAP_COMPANY_DB", "SAP_USERNAME", "SAP_PASSWORD"];
        let values: Vec<Option<String>> = keys.iter().map(|k| get_optional_env(k)).collect();

        match values.as_slice() {
            [Some(service_url), Some(company_db), Some(username), Some(password)] => {
                Ok(Some(Self {
                    service_url: service_url.trim_end_matches('/').to_owned(),
                    company_db: company_db.clone(),
                    username: username.clone(),
                    password: SecretString::from(password.clone()),
                    price_list: parse_env("SAP_PRICE_LIST", "1")?,
                }))
            }
            [None, None, None, None] => Ok(None),
            _ => {
                let missing = keys
                    .iter()
                    .zip(&values)
                    .find(|(_, v)| v.is_none())
                    .map_or("SAP_*", |(k, _)| *k);
                Err(ConfigError::MissingEnvVar(missing.to_owned()))
            }
        }
    }
}

impl DocumentStorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Self::select(
            &get_env_or_default("DOCUMENT_STORAGE", "local"),
            get_optional_env("S3_BUCKET"),
            get_optional_env("S3_REGION"),
            get_optional_env("S3_ENDPOINT"),
            &get_env_or_default("UPLOAD_DIR", "uploads"),
        )
    }

    fn select(
        backend: &str,
        bucket: Option<String>,
        region: Option<String>,
        endpoint: Option<String>,
        upload_dir: &str,
    ) -> Result<Self, ConfigError> {
        match backend.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local {
                dir: PathBuf::from(upload_dir),
            }),
            "s3" => {
                let bucket =
                    bucket.ok_or_else(|| ConfigError::MissingEnvVar("S3_BUCKET".to_owned()))?;
                if let Some(endpoint) = &endpoint {
                    url::Url::parse(endpoint).map_err(|e| {
                        ConfigError::InvalidEnvVar("S3_ENDPOINT".to_owned(), e.to_string())
                    })?;
                }
                Ok(Self::S3 {
                    bucket,
                    region,
                    endpoint,
                })
            }
            other => Err(ConfigError::InvalidEnvVar(
                "DOCUMENT_STORAGE".to_owned(),
                format!("expected 'local' or 's3', got '{other}'"),
            )),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable; empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse the boolean spellings used in deployment `.env` files.
fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "require" => Ok(true),
        "false" | "0" | "no" | "" | "disable" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
