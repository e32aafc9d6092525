//! Identity and certificate trust for the Portcullis door-access client.
//!
//! This crate establishes a locally held Ed25519 identity, exchanges it for a
//! short-lived server-issued certificate, and keeps that certificate fresh.
//! Signed device operations are only ever produced from the state held here.
//!
//! # Core Concepts
//!
//! - **Auth Credential**: Opaque bearer token naming the account in use
//! - **Ephemeral Identity**: Keypair generated once and persisted
//! - **Certificate Ledger**: Issuance, renewal threshold, per-account caching
//! - **Session Gate**: Whether an existing session can be reused untouched
//! - **Two-Factor Flow**: Completing issuance after a step-up challenge
//!
//! # Security Model
//!
//! - Certificates inside the renewal window are never used
//! - Unparseable certificates and corrupt key material are treated as absent
//! - One issuance in flight per account; keys generated at most once
//! - Credentials, private keys and verification codes are never logged

pub mod bootstrap;
pub mod certificate;
pub mod credential;
pub mod ephemeral;
pub mod error;
pub mod issuer;
pub mod ledger;
pub mod session;
pub mod two_factor;
pub mod x509;

#[cfg(test)]
mod testing;

pub use bootstrap::{InitOutcome, TrustBootstrap};
pub use certificate::{
    within_validity, Certificate, CertificateOutcome, CertificateState, Validity,
    VerificationChallenge, VerificationMethod,
};
pub use credential::{AuthCredential, CredentialStore, CREDENTIAL_ENTRY};
pub use ephemeral::{EphemeralIdentity, KeyOrigin, PRIVATE_KEY_ENTRY, PUBLIC_KEY_ENTRY};
pub use error::{ErrorKind, IdentityError, IdentityResult};
pub use issuer::{CertificateIssuer, IssuerError};
pub use ledger::{certificate_entry, CertificateLedger, LedgerSettings};
pub use session::SessionGate;
pub use two_factor::TwoFactorFlow;
pub use x509::{CertificateParseError, ExpiryParser, X509ExpiryParser, MAX_CERT_SIZE};
