//! Email service for password reset links and account notifications.
//!
//! Uses SMTP via lettre for delivery with Askama HTML templates.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;

/// HTML template for the password reset email.
#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetEmailHtml<'a> {
    name: &'a str,
    reset_link: &'a str,
    expires_minutes: i64,
}

/// Plain text template for the password reset email.
#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetEmailText<'a> {
    name: &'a str,
    reset_link: &'a str,
    expires_minutes: i64,
}

#[derive(Template)]
#[template(path = "email/password_changed.html")]
struct PasswordChangedEmailHtml<'a> {
    name: &'a str,
    changed_at: &'a str,
    frontend_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_changed.txt")]
struct PasswordChangedEmailText<'a> {
    name: &'a str,
    changed_at: &'a str,
    frontend_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A rendered message ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: &'static str,
    pub text: String,
    pub html: String,
}

/// Render the password reset email.
///
/// # Errors
///
/// Returns error if a template fails to render.
pub fn render_password_reset(
    name: &str,
    reset_link: &str,
    expires_minutes: i64,
) -> Result<RenderedEmail, EmailError> {
    Ok(RenderedEmail {
        subject: "Restablece tu contraseña de La Artesa",
        text: PasswordResetEmailText {
            name,
            reset_link,
            expires_minutes,
        }
        .render()?,
        html: PasswordResetEmailHtml {
            name,
            reset_link,
            expires_minutes,
        }
        .render()?,
    })
}

/// Render the password changed notification.
///
/// # Errors
///
/// Returns error if a template fails to render.
pub fn render_password_changed(
    name: &str,
    changed_at: &str,
    frontend_url: &str,
) -> Result<RenderedEmail, EmailError> {
    Ok(RenderedEmail {
        subject: "Tu contraseña de La Artesa fue cambiada",
        text: PasswordChangedEmailText {
            name,
            changed_at,
            frontend_url,
        }
        .render()?,
        html: PasswordChangedEmailHtml {
            name,
            changed_at,
            frontend_url,
        }
        .render()?,
    })
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send the password reset link.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_password_reset(
        &self,
        to: &str,
        name: &str,
        reset_link: &str,
        expires_minutes: i64,
    ) -> Result<(), EmailError> {
        let email = render_password_reset(name, reset_link, expires_minutes)?;
        self.send_multipart_email(to, &email).await
    }

    /// Notify a user that their password was changed.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_password_changed(
        &self,
        to: &str,
        name: &str,
        changed_at: &str,
        frontend_url: &str,
    ) -> Result<(), EmailError> {
        let email = render_password_changed(name, changed_at, frontend_url)?;
        self.send_multipart_email(to, &email).await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(&self, to: &str, email: &RenderedEmail) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(email.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html.clone()),
                    ),
            )?;

        self.mailer.send(message).await?;

        tracing::info!(to = %to, subject = %email.subject, "Email sent successfully");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LINK: &str =
        "https://laartesa.co/reset-password/0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_password_reset_contains_link_in_both_parts() {
        let email = render_password_reset("Camila", LINK, 60).unwrap();
        assert!(email.text.contains(LINK));
        assert!(email.html.contains("0123456789abcdef0123456789abcdef"));
        assert!(email.text.contains("Hola Camila"));
        assert!(email.text.contains("60 minutos"));
    }

    #[test]
    fn test_html_escapes_names() {
        let email = render_password_reset("<b>Ana</b>", LINK, 60).unwrap();
        assert!(!email.html.contains("<b>Ana</b>"));
    }

    #[test]
    fn test_password_changed_mentions_time_and_recovery_link() {
        let email =
            render_password_changed("Camila", "2026-10-19 14:03 UTC", "https://laartesa.co").unwrap();
        assert!(email.text.contains("2026-10-19 14:03 UTC"));
        assert!(email.html.contains("forgot-password"));
    }
}
