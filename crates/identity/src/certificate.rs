//! Certificate and verification-challenge types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-issued certificate binding the ephemeral public key to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// Base64 DER X.509 certificates, leaf first.
    pub certificate_chain: Vec<String>,
    /// User the certificate is bound to; becomes the `iss` of signed operations.
    pub user_id: String,
    /// Full server payload, kept for callers that need extra fields.
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificateBody {
    certificate_chain: Vec<String>,
    user_id: String,
}

impl Certificate {
    /// Build a certificate from the issuing service's JSON body.
    pub fn from_payload(raw: serde_json::Value) -> Result<Self, String> {
        let body: CertificateBody =
            serde_json::from_value(raw.clone()).map_err(|e| e.to_string())?;
        if body.certificate_chain.is_empty() {
            return Err("certificateChain is empty".to_string());
        }
        if body.user_id.is_empty() {
            return Err("userId is empty".to_string());
        }
        Ok(Self {
            certificate_chain: body.certificate_chain,
            user_id: body.user_id,
            raw,
        })
    }

    /// The leaf (end-entity) certificate.
    pub fn leaf(&self) -> Option<&str> {
        self.certificate_chain.first().map(String::as_str)
    }
}

/// Channel through which a step-up verification code is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VerificationMethod {
    Sms,
    Email,
    Totp,
    Other(String),
}

impl From<String> for VerificationMethod {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "sms" => VerificationMethod::Sms,
            "email" => VerificationMethod::Email,
            "totp" => VerificationMethod::Totp,
            _ => VerificationMethod::Other(value),
        }
    }
}

impl From<&str> for VerificationMethod {
    fn from(value: &str) -> Self {
        VerificationMethod::from(value.to_string())
    }
}

impl From<VerificationMethod> for String {
    fn from(method: VerificationMethod) -> Self {
        method.to_string()
    }
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationMethod::Sms => f.write_str("sms"),
            VerificationMethod::Email => f.write_str("email"),
            VerificationMethod::Totp => f.write_str("totp"),
            VerificationMethod::Other(other) => f.write_str(other),
        }
    }
}

/// Step-up challenge returned when the server demands verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationChallenge {
    pub method: VerificationMethod,
}

impl VerificationChallenge {
    pub fn new(method: impl Into<VerificationMethod>) -> Self {
        Self {
            method: method.into(),
        }
    }
}

/// Successful result of ensuring a certificate.
#[derive(Debug, Clone, PartialEq)]
pub enum CertificateOutcome {
    /// A certificate passing the validity check is cached.
    Valid(Certificate),
    /// The server demands a verification code first.
    VerificationRequired(VerificationChallenge),
}

impl CertificateOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, CertificateOutcome::Valid(_))
    }

    pub fn certificate(&self) -> Option<&Certificate> {
        match self {
            CertificateOutcome::Valid(cert) => Some(cert),
            CertificateOutcome::VerificationRequired(_) => None,
        }
    }

    pub fn challenge(&self) -> Option<&VerificationChallenge> {
        match self {
            CertificateOutcome::VerificationRequired(challenge) => Some(challenge),
            CertificateOutcome::Valid(_) => None,
        }
    }
}

/// Lifecycle state of an account's certificate.
///
/// ```text
/// Absent ──issue──▶ Pending ──200──▶ Valid ──(renewal window)──▶ ExpiringSoon
///                      │                                             │
///                      └──423──▶ AwaitingVerification ──code──▶ Valid│
///                                                                    ▼
///                                                          Pending (next use)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateState {
    /// Nothing cached.
    Absent,
    /// An issuance request is in flight.
    Pending,
    /// Cached and outside the renewal window.
    Valid { not_after: i64 },
    /// Cached but inside the renewal window or already expired.
    ExpiringSoon { not_after: i64 },
    /// Step-up verification outstanding.
    AwaitingVerification { method: VerificationMethod },
    /// Cached entry could not be parsed.
    Invalid,
}

/// Result of checking a certificate against the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid { not_after: i64 },
    ExpiringSoon { not_after: i64 },
    Malformed(String),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid { .. })
    }
}

/// `now < not_after - threshold`, computed without overflow.
pub fn within_validity(now: u64, not_after: i64, renewal_threshold_secs: u64) -> bool {
    (now as i128) + (renewal_threshold_secs as i128) < not_after as i128
}
