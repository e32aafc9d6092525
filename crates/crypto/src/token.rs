//! Signed operation tokens.
//!
//! A device operation is authorised by a compact JWS:
//!
//! ```text
//! base64url(header) "." base64url(claims) "." base64url(ed25519(signing_input))
//! ```
//!
//! The header carries the certificate chain (`x5c`) that binds the signing key
//! to the issuing user. Claims are short-lived (`exp = iat + lifetime`) and
//! carry a random `jti` so the device service can reject replays.

use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::encoding;
use crate::keys::EphemeralKeyPair;

/// JWS algorithm name for Ed25519.
pub const ALGORITHM: &str = "EdDSA";

/// JWS `typ` header value.
pub const TOKEN_TYPE: &str = "JWT";

/// Errors raised while building or checking a signed operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Certificate chain is empty")]
    MissingCertificateChain,

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signature verification failed")]
    InvalidSignature,

    #[error("Token not valid before {nbf} (now {now})")]
    NotYetValid { nbf: u64, now: u64 },

    #[error("Token expired at {exp} (now {now})")]
    Expired { exp: u64, now: u64 },
}

/// JOSE header of a signed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
    /// Base64 DER certificates, leaf first.
    pub x5c: Vec<String>,
}

impl TokenHeader {
    pub fn new(certificate_chain: Vec<String>) -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: TOKEN_TYPE.to_string(),
            x5c: certificate_chain,
        }
    }
}

/// Claims of a signed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationClaims {
    /// User the certificate is bound to.
    pub iss: String,
    /// Target device.
    pub sub: String,
    pub nbf: u64,
    pub iat: u64,
    pub exp: u64,
    /// Replay nonce.
    pub jti: String,
    pub operation: serde_json::Value,
}

impl OperationClaims {
    /// Build claims valid from `issued_at` for `lifetime_secs`.
    pub fn new(
        issuer: impl Into<String>,
        device_id: impl Into<String>,
        operation: serde_json::Value,
        issued_at: u64,
        lifetime_secs: u64,
        nonce: impl Into<String>,
    ) -> Self {
        Self {
            iss: issuer.into(),
            sub: device_id.into(),
            nbf: issued_at,
            iat: issued_at,
            exp: issued_at.saturating_add(lifetime_secs),
            jti: nonce.into(),
            operation,
        }
    }

    fn validate(&self) -> Result<(), TokenError> {
        if self.iss.is_empty() {
            return Err(TokenError::InvalidField {
                field: "iss".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.sub.is_empty() {
            return Err(TokenError::InvalidField {
                field: "sub".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.jti.is_empty() {
            return Err(TokenError::InvalidField {
                field: "jti".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.exp <= self.iat {
            return Err(TokenError::InvalidField {
                field: "exp".to_string(),
                reason: format!("must be after iat ({} <= {})", self.exp, self.iat),
            });
        }
        Ok(())
    }
}

/// Fresh random replay nonce.
pub fn new_nonce() -> String {
    Uuid::new_v4().to_string()
}

/// A signed, compact-serialised device operation.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedOperation {
    header: TokenHeader,
    claims: OperationClaims,
    signature: Vec<u8>,
    compact: String,
}

impl SignedOperation {
    /// Sign `claims` with `keys`, embedding `certificate_chain` in the header.
    ///
    /// Deterministic for fixed claims: Ed25519 signatures carry no randomness,
    /// so freshness comes entirely from `iat` and `jti`.
    pub fn sign(
        keys: &EphemeralKeyPair,
        certificate_chain: Vec<String>,
        claims: OperationClaims,
    ) -> Result<Self, TokenError> {
        if certificate_chain.is_empty() {
            return Err(TokenError::MissingCertificateChain);
        }
        claims.validate()?;

        let header = TokenHeader::new(certificate_chain);
        let header_json =
            serde_json::to_vec(&header).map_err(|e| TokenError::Serialization(e.to_string()))?;
        let claims_json =
            serde_json::to_vec(&claims).map_err(|e| TokenError::Serialization(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            encoding::encode_url(&header_json),
            encoding::encode_url(&claims_json)
        );
        let signature = keys.sign(signing_input.as_bytes());
        let compact = format!("{}.{}", signing_input, encoding::encode_url(&signature));

        Ok(Self {
            header,
            claims,
            signature: signature.to_vec(),
            compact,
        })
    }

    /// Parse and check a compact token against `public_key` at time `now`.
    ///
    /// Checks the header algorithm and type, a non-empty `x5c`, the Ed25519
    /// signature over the signing input, and `nbf <= now < exp`.
    pub fn verify(token: &str, public_key: &VerifyingKey, now: u64) -> Result<Self, TokenError> {
        let mut parts = token.split('.');
        let (header_b64, claims_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(c), Some(s), None) => (h, c, s),
                _ => {
                    return Err(TokenError::Malformed(
                        "expected three dot-separated segments".to_string(),
                    ))
                }
            };

        let header: TokenHeader = decode_segment(header_b64, "header")?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }
        if header.typ != TOKEN_TYPE {
            return Err(TokenError::Malformed(format!("unexpected typ {}", header.typ)));
        }
        if header.x5c.is_empty() {
            return Err(TokenError::MissingCertificateChain);
        }

        let signature_bytes = encoding::decode_url(signature_b64)
            .map_err(|e| TokenError::Malformed(format!("signature: {}", e)))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|_| TokenError::Malformed("signature must be 64 bytes".to_string()))?;

        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        public_key
            .verify_strict(signing_input.as_bytes(), &signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: OperationClaims = decode_segment(claims_b64, "claims")?;
        if now < claims.nbf {
            return Err(TokenError::NotYetValid {
                nbf: claims.nbf,
                now,
            });
        }
        if now >= claims.exp {
            return Err(TokenError::Expired {
                exp: claims.exp,
                now,
            });
        }

        Ok(Self {
            header,
            claims,
            signature: signature_bytes,
            compact: token.to_string(),
        })
    }

    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    pub fn claims(&self) -> &OperationClaims {
        &self.claims
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The compact `header.claims.signature` string sent to the device service.
    pub fn compact(&self) -> &str {
        &self.compact
    }

    pub fn into_compact(self) -> String {
        self.compact
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    what: &str,
) -> Result<T, TokenError> {
    let bytes = encoding::decode_url(segment)
        .map_err(|e| TokenError::Malformed(format!("{}: {}", what, e)))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(format!("{}: {}", what, e)))
}
