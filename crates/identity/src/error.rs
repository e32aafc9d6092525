//! Error types for Portcullis identity operations.
//!
//! Callers receive one of three shapes: a usable certificate, a
//! verification challenge, or an [`IdentityError`] whose [`ErrorKind`] can be
//! matched without inspecting server payloads.

use portcullis_core::CoreError;
use portcullis_crypto::{KeyError, TokenError};
use thiserror::Error;

use crate::certificate::VerificationMethod;

/// Errors that can occur in identity, certificate and signing operations.
///
/// `Clone` so that a single in-flight issuance can hand the same outcome to
/// every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// No keypair is available for the operation
    #[error("Identity keys unavailable")]
    KeysUnavailable,

    /// The certificate authority refused or failed to issue a certificate
    #[error("Certificate issuance failed (status {status:?}): {reason}")]
    CertificateIssuanceFailed { status: Option<u16>, reason: String },

    /// Step-up verification must be completed before a certificate is issued
    #[error("Verification required via {method}")]
    VerificationRequired { method: VerificationMethod },

    /// The submitted verification code was not accepted
    #[error("Verification failed: {reason}")]
    VerificationFailed { reason: String },

    /// Too many pending verifications; back off before retrying
    #[error("Rate limited by certificate service")]
    RateLimited,

    /// A collaborator call exceeded its deadline
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    /// Cached certificate could not be parsed (recovered locally as a miss)
    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    /// Supplied credential does not match the stored one
    #[error("Session credential mismatch")]
    SessionCredentialMismatch,

    /// No bearer credential has been supplied
    #[error("No auth credential provided")]
    MissingCredential,

    /// The device service rejected a signed operation
    #[error("Device rejected operation (status {status}): {reason}")]
    DeviceRejected { status: u16, reason: String },

    /// Network-level failure talking to a collaborator
    #[error("Transport error: {0}")]
    Transport(String),

    /// Persistent store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid key material
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    /// Token construction failure
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Flat discriminant of [`IdentityError`] for UI branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    KeysUnavailable,
    CertificateIssuanceFailed,
    VerificationRequired,
    VerificationFailed,
    RateLimited,
    Timeout,
    MalformedCertificate,
    SessionCredentialMismatch,
    MissingCredential,
    DeviceRejected,
    Transport,
    Store,
    Key,
    Token,
    InvalidState,
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::KeysUnavailable => ErrorKind::KeysUnavailable,
            IdentityError::CertificateIssuanceFailed { .. } => ErrorKind::CertificateIssuanceFailed,
            IdentityError::VerificationRequired { .. } => ErrorKind::VerificationRequired,
            IdentityError::VerificationFailed { .. } => ErrorKind::VerificationFailed,
            IdentityError::RateLimited => ErrorKind::RateLimited,
            IdentityError::Timeout { .. } => ErrorKind::Timeout,
            IdentityError::MalformedCertificate(_) => ErrorKind::MalformedCertificate,
            IdentityError::SessionCredentialMismatch => ErrorKind::SessionCredentialMismatch,
            IdentityError::MissingCredential => ErrorKind::MissingCredential,
            IdentityError::DeviceRejected { .. } => ErrorKind::DeviceRejected,
            IdentityError::Transport(_) => ErrorKind::Transport,
            IdentityError::Store(_) => ErrorKind::Store,
            IdentityError::Key(_) => ErrorKind::Key,
            IdentityError::Token(_) => ErrorKind::Token,
            IdentityError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }

    /// Whether retrying immediately is pointless (the caller should back off
    /// or involve the user).
    pub fn requires_backoff(&self) -> bool {
        matches!(
            self,
            IdentityError::RateLimited | IdentityError::VerificationRequired { .. }
        )
    }
}

impl From<CoreError> for IdentityError {
    fn from(err: CoreError) -> Self {
        IdentityError::Store(err.to_string())
    }
}

/// Result type for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;
