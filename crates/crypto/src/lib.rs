//! Cryptographic primitives for the Portcullis door-access client.
//!
//! - **Identity keys**: Ed25519 keypairs that prove possession when requesting
//!   and using a certificate
//! - **Encodings**: the base64 variants used for storage, requests and tokens
//! - **Signed operations**: compact EdDSA tokens authorising one device action
//!
//! # Security Principles
//!
//! - Private key material is zeroized on drop and never rendered by `Debug`
//! - Every token carries a fresh nonce and a short expiry

pub mod encoding;
pub mod keys;
pub mod token;

pub use keys::{EphemeralKeyPair, KeyError, PRIVATE_KEY_LENGTH, PUBLIC_KEY_LENGTH};
pub use token::{
    new_nonce, OperationClaims, SignedOperation, TokenError, TokenHeader, ALGORITHM, TOKEN_TYPE,
};

pub use ed25519_dalek::VerifyingKey;
