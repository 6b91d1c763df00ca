//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Registration, login and password changes (argon2)
//! - `password_reset` - Reset tokens, reset emails and token redemption
//! - `email` - Transactional mail over SMTP
//! - `recaptcha` - reCAPTCHA v3 verification for public forms
//! - `orders` - Order placement, pricing and status workflow
//! - `payments` - Payment recording and review
//! - `documents` - Client document storage
//! - `sap` - SAP Business One imports
//!
//! Services borrow what they need from `AppState` and are built per request.

pub mod auth;
pub mod documents;
pub mod email;
pub mod orders;
pub mod password_reset;
pub mod payments;
pub mod recaptcha;
pub mod sap;

pub use auth::{AuthError, AuthService};
pub use documents::{DocumentError, DocumentStore};
pub use email::{EmailError, EmailService};
pub use orders::{OrderError, OrderService};
pub use password_reset::{PasswordResetError, PasswordResetService};
pub use payments::{PaymentError, PaymentService};
pub use recaptcha::{RecaptchaError, RecaptchaVerifier};
pub use sap::{SapClient, SapError};
