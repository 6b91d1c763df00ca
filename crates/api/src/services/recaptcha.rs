//! Google reCAPTCHA verification.
//!
//! Tokens are posted to the siteverify endpoint. v3 responses carry a score
//! that must reach the configured minimum; v2 responses only carry
//! `success`.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::config::RecaptchaConfig;

/// Errors from reCAPTCHA verification.
#[derive(Debug, Error)]
pub enum RecaptchaError {
    /// The client did not send a token.
    #[error("missing reCAPTCHA token")]
    MissingToken,

    /// Google rejected the token or the score was too low.
    #[error("reCAPTCHA verification failed")]
    Rejected { codes: Vec<String>, score: Option<f64> },

    /// The verification endpoint could not be reached or answered garbage.
    #[error("reCAPTCHA service unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),
}

/// Siteverify response body.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteVerifyResponse {
    pub success: bool,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, rename = "error-codes")]
    pub error_codes: Vec<String>,
}

/// Decide whether a siteverify response passes.
///
/// # Errors
///
/// Returns `RecaptchaError::Rejected` on failure or a score below `min_score`.
pub fn evaluate(response: SiteVerifyResponse, min_score: f64) -> Result<(), RecaptchaError> {
    let score_ok = response.score.is_none_or(|score| score >= min_score);
    if response.success && score_ok {
        return Ok(());
    }
    Err(RecaptchaError::Rejected {
        codes: response.error_codes,
        score: response.score,
    })
}

/// reCAPTCHA verifier. Disabled when no secret key is configured.
#[derive(Clone)]
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    secret: Option<SecretString>,
    min_score: f64,
    verify_url: String,
}

impl RecaptchaVerifier {
    /// Create a verifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &RecaptchaConfig) -> Result<Self, RecaptchaError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        if config.secret_key.is_none() {
            tracing::warn!("RECAPTCHA_SECRET_KEY not set, reCAPTCHA checks are disabled");
        }

        Ok(Self {
            client,
            secret: config.secret_key.clone(),
            min_score: config.min_score,
            verify_url: config.verify_url.clone(),
        })
    }

    /// Whether tokens are actually checked.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify a client token.
    ///
    /// # Errors
    ///
    /// Returns `RecaptchaError::MissingToken` for an absent token,
    /// `RecaptchaError::Rejected` when Google says no, and
    /// `RecaptchaError::Unavailable` on network failure.
    pub async fn verify(
        &self,
        token: Option<&str>,
        remote_ip: Option<&str>,
    ) -> Result<(), RecaptchaError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };

        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(RecaptchaError::MissingToken)?;

        let mut form = vec![("secret", secret.expose_secret()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response: SiteVerifyResponse = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let action = response.action.clone();
        let result = evaluate(response, self.min_score);
        if let Err(RecaptchaError::Rejected { codes, score }) = &result {
            tracing::info!(?codes, ?score, ?action, "reCAPTCHA rejected");
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn response(success: bool, score: Option<f64>) -> SiteVerifyResponse {
        SiteVerifyResponse {
            success,
            score,
            action: None,
            error_codes: Vec::new(),
        }
    }

    #[test]
    fn test_evaluate_v2_success() {
        assert!(evaluate(response(true, None), 0.5).is_ok());
    }

    #[test]
    fn test_evaluate_score_threshold() {
        assert!(evaluate(response(true, Some(0.5)), 0.5).is_ok());
        assert!(evaluate(response(true, Some(0.9)), 0.5).is_ok());
        assert!(matches!(
            evaluate(response(true, Some(0.3)), 0.5),
            Err(RecaptchaError::Rejected { score: Some(_), .. })
        ));
    }

    #[test]
    fn test_evaluate_failure_keeps_codes() {
        let mut resp = response(false, None);
        resp.error_codes = vec!["timeout-or-duplicate".to_owned()];
        match evaluate(resp, 0.5) {
            Err(RecaptchaError::Rejected { codes, .. }) => {
                assert_eq!(codes, vec!["timeout-or-duplicate".to_owned()]);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_response_deserializes_error_codes() {
        let resp: SiteVerifyResponse = serde_json::from_str(
            r#"{"success": false, "error-codes": ["invalid-input-response"]}"#,
        )
        .unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error_codes, vec!["invalid-input-response".to_owned()]);
    }

    fn config(secret: Option<&str>) -> RecaptchaConfig {
        RecaptchaConfig {
            secret_key: secret.map(|s| SecretString::from(s.to_owned())),
            min_score: 0.5,
            verify_url: "http://127.0.0.1:9/siteverify".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_disabled_verifier_accepts_anything() {
        let verifier = RecaptchaVerifier::new(&config(None)).unwrap();
        assert!(!verifier.is_enabled());
        assert!(verifier.verify(None, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_token_rejected_without_network() {
        let verifier = RecaptchaVerifier::new(&config(Some("secret"))).unwrap();
        assert!(matches!(
            verifier.verify(Some("   "), None).await,
            Err(RecaptchaError::MissingToken)
        ));
        assert!(matches!(
            verifier.verify(None, None).await,
            Err(RecaptchaError::MissingToken)
        ));
    }

    async fn siteverify_stub(reply: serde_json::Value) -> String {
        use axum::{Json, Router, routing::post};

        let app = Router::new().route(
            "/siteverify",
            post(move || {
                let reply = reply.clone();
                async move { Json(reply) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/siteverify")
    }

    fn enabled(verify_url: String) -> RecaptchaVerifier {
        RecaptchaVerifier::new(&RecaptchaConfig {
            verify_url,
            ..config(Some("secret"))
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_verify_applies_score_from_siteverify() {
        let url = siteverify_stub(serde_json::json!({
            "success": true, "score": 0.9, "action": "password_reset"
        }))
        .await;
        assert!(enabled(url).verify(Some("token"), Some("190.24.1.9")).await.is_ok());

        let url = siteverify_stub(serde_json::json!({ "success": true, "score": 0.1 })).await;
        assert!(matches!(
            enabled(url).verify(Some("token"), None).await,
            Err(RecaptchaError::Rejected { score: Some(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_bad_gateway() {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        // Reserve a port, then close it
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = enabled(format!("http://{addr}/siteverify"))
            .verify(Some("token"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RecaptchaError::Unavailable(_)));

        let response = crate::error::AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["errorCode"], "RECAPTCHA_UNAVAILABLE");
    }
}
