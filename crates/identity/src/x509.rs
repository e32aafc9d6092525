//! X.509 expiry extraction.
//!
//! The ledger only needs one fact from a certificate chain: when the leaf
//! stops being valid. Parsing sits behind [`ExpiryParser`] so the renewal
//! policy can be exercised without real certificates.
//!
//! # Security
//!
//! - Every element of the chain must decode and parse; one bad element makes
//!   the whole chain unusable
//! - Each DER input is capped at 16KB before it reaches the ASN.1 parser

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Maximum DER size accepted for a single certificate.
pub const MAX_CERT_SIZE: usize = 16 * 1024;

/// Errors that can occur while reading a certificate chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateParseError {
    #[error("certificate chain is empty")]
    EmptyChain,

    #[error("certificate {index} is not valid base64: {reason}")]
    Encoding { index: usize, reason: String },

    #[error("certificate {index} too large: {size} bytes (max {MAX_CERT_SIZE})")]
    TooLarge { index: usize, size: usize },

    #[error("failed to parse X.509 certificate {index}: {reason}")]
    Parse { index: usize, reason: String },
}

/// Extracts the leaf `notAfter` (Unix seconds) from a base64-DER chain.
pub trait ExpiryParser: Send + Sync {
    fn parse_leaf_expiry(&self, chain: &[String]) -> Result<i64, CertificateParseError>;
}

/// [`ExpiryParser`] backed by `x509-parser`.
#[derive(Debug, Default, Clone, Copy)]
pub struct X509ExpiryParser;

impl ExpiryParser for X509ExpiryParser {
    fn parse_leaf_expiry(&self, chain: &[String]) -> Result<i64, CertificateParseError> {
        let mut leaf_not_after = None;

        for (index, encoded) in chain.iter().enumerate() {
            let der = STANDARD
                .decode(encoded.trim())
                .map_err(|e| CertificateParseError::Encoding {
                    index,
                    reason: e.to_string(),
                })?;

            if der.len() > MAX_CERT_SIZE {
                return Err(CertificateParseError::TooLarge {
                    index,
                    size: der.len(),
                });
            }

            let (_, cert) =
                X509Certificate::from_der(&der).map_err(|e| CertificateParseError::Parse {
                    index,
                    reason: e.to_string(),
                })?;

            if index == 0 {
                leaf_not_after = Some(cert.validity().not_after.timestamp());
            }
        }

        leaf_not_after.ok_or(CertificateParseError::EmptyChain)
    }
}
