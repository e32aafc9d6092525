//! Certificate authority collaborator contract.
//!
//! The ledger talks to the issuing service only through [`CertificateIssuer`].
//! The HTTP implementation lives in `portcullis-client`; tests substitute
//! in-process fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::certificate::{Certificate, VerificationChallenge};
use crate::credential::AuthCredential;

/// Failure reported by a [`CertificateIssuer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssuerError {
    /// The service wants step-up verification before issuing (HTTP 423).
    #[error("step-up verification required")]
    StepUpRequired,

    /// Too many pending verifications (HTTP 429).
    #[error("rate limited")]
    RateLimited,

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl IssuerError {
    pub fn status(&self) -> Option<u16> {
        match self {
            IssuerError::StepUpRequired => Some(423),
            IssuerError::RateLimited => Some(429),
            IssuerError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Remote certificate authority.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Request a certificate for `ephemeral_key` (already encoded).
    async fn request_certificate(
        &self,
        credential: &AuthCredential,
        ephemeral_key: &str,
    ) -> Result<Certificate, IssuerError>;

    /// Ask the service to send a verification code for `ephemeral_key`.
    async fn request_step_up(
        &self,
        credential: &AuthCredential,
        ephemeral_key: &str,
    ) -> Result<VerificationChallenge, IssuerError>;

    /// Exchange a base64 signature over the verification code for a certificate.
    async fn check_verification(
        &self,
        credential: &AuthCredential,
        verification_signature: &str,
    ) -> Result<Certificate, IssuerError>;
}
