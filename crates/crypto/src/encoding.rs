//! Base64 encodings used on the wire and at rest.
//!
//! Key halves and verification signatures travel as padded standard base64.
//! Token segments are base64url without padding.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use portcullis_core::KeyEncoding;

use crate::keys::KeyError;

/// Encode bytes as padded standard base64.
pub fn encode_standard(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode padded standard base64.
pub fn decode_standard(value: &str) -> Result<Vec<u8>, KeyError> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| KeyError::Encoding(e.to_string()))
}

/// Encode bytes as unpadded base64url.
pub fn encode_url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded base64url.
pub fn decode_url(value: &str) -> Result<Vec<u8>, KeyError> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| KeyError::Encoding(e.to_string()))
}

/// Encode a public key for a certificate request.
pub fn encode_public_key(bytes: &[u8], encoding: KeyEncoding) -> String {
    match encoding {
        KeyEncoding::Standard => encode_standard(bytes),
        KeyEncoding::UrlSafeNoPad => encode_url(bytes),
    }
}
