//! Verification email support: code generation, message templates, and
//! an SMTP transport behind a trait so handlers and tests never touch
//! lettre directly.

mod code;
mod smtp;
mod templates;

pub use code::generate_verify_code;
pub use smtp::{SmtpConfig, SmtpMailer};
pub use templates::VerificationEmail;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("failed to send email: {0}")]
    SendFailed(String),

    #[error("invalid email configuration: {0}")]
    InvalidConfig(String),
}

/// Delivery collaborator for the verification flow. The account record
/// is persisted before this is called; a failure here leaves the stored
/// code intact so the caller can offer a resend.
#[async_trait]
pub trait VerificationMailer: Send + Sync {
    async fn send_verification(
        &self,
        to: &str,
        username: &str,
        code: &str,
    ) -> Result<(), EmailError>;
}
