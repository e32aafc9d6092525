//! Ephemeral Ed25519 identity keys.
//!
//! The private half uses the 64-byte `seed || public` layout so persisted
//! material stays interchangeable with libsodium-style stores.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::encoding;

/// Length of an Ed25519 public key.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of the `seed || public` private key encoding.
pub const PRIVATE_KEY_LENGTH: usize = 64;

/// Errors raised while decoding or validating key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Invalid {what} length: {actual} (expected {expected})")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Public key does not match private key")]
    Mismatch,

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Client identity keypair.
///
/// The signing key is zeroized on drop; `Debug` never prints secret material.
#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralKeyPair {
    signing_key: SigningKey,
}

impl EphemeralKeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();

        Self { signing_key }
    }

    /// Rebuild a keypair from its public and 64-byte private halves.
    pub fn from_parts(public_key: &[u8], private_key: &[u8]) -> Result<Self, KeyError> {
        if public_key.len() != PUBLIC_KEY_LENGTH {
            return Err(KeyError::InvalidLength {
                what: "public key",
                expected: PUBLIC_KEY_LENGTH,
                actual: public_key.len(),
            });
        }
        if private_key.len() != PRIVATE_KEY_LENGTH {
            return Err(KeyError::InvalidLength {
                what: "private key",
                expected: PRIVATE_KEY_LENGTH,
                actual: private_key.len(),
            });
        }

        let mut keypair_bytes = Zeroizing::new([0u8; PRIVATE_KEY_LENGTH]);
        keypair_bytes.copy_from_slice(private_key);
        let signing_key =
            SigningKey::from_keypair_bytes(&keypair_bytes).map_err(|_| KeyError::Mismatch)?;

        if signing_key.verifying_key().as_bytes() != public_key {
            return Err(KeyError::Mismatch);
        }

        Ok(Self { signing_key })
    }

    /// Rebuild a keypair from base64-encoded halves, as persisted.
    pub fn from_encoded(public_key: &str, private_key: &str) -> Result<Self, KeyError> {
        let public = encoding::decode_standard(public_key)?;
        let private = Zeroizing::new(encoding::decode_standard(private_key)?);
        Self::from_parts(&public, &private)
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The 64-byte `seed || public` private key.
    pub fn private_key(&self) -> Zeroizing<[u8; PRIVATE_KEY_LENGTH]> {
        Zeroizing::new(self.signing_key.to_keypair_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Public key as padded standard base64 (storage form).
    pub fn encoded_public_key(&self) -> String {
        encoding::encode_standard(&self.public_key())
    }

    /// Private key as padded standard base64 (storage form).
    pub fn encoded_private_key(&self) -> Zeroizing<String> {
        Zeroizing::new(encoding::encode_standard(self.private_key().as_ref()))
    }

    /// Detached Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public_key", &self.encoded_public_key())
            .finish_non_exhaustive()
    }
}
