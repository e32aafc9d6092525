//! Bearer credential handling.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use portcullis_core::KeyStore;
use std::fmt;
use std::sync::Arc;

use crate::error::{IdentityError, IdentityResult};

/// Store key for the persisted bearer credential.
pub const CREDENTIAL_ENTRY: &str = "auth.credential";

/// Opaque bearer token supplied by the caller.
///
/// Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AuthCredential(String);

impl AuthCredential {
    pub fn new(token: impl Into<String>) -> IdentityResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(IdentityError::MissingCredential);
        }
        Ok(Self(token))
    }

    /// The raw token, for the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Account the credential belongs to.
    ///
    /// Read from the unverified JWT payload (`email`, then `sub`). Tokens that
    /// are not JWTs fall back to a digest prefix so accounts stay separated.
    pub fn account_id(&self) -> String {
        if let Some(account) = self.jwt_subject() {
            return account;
        }
        let digest = blake3::hash(self.0.as_bytes());
        format!("acct-{}", hex::encode(&digest.as_bytes()[..8]))
    }

    fn jwt_subject(&self) -> Option<String> {
        let mut parts = self.0.split('.');
        let payload = match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_)) => payload,
            _ => return None,
        };
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;

        ["email", "sub"]
            .iter()
            .filter_map(|field| claims.get(field).and_then(|v| v.as_str()))
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }
}

impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthCredential(<redacted>)")
    }
}

/// Persists the most recently initialised credential.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> IdentityResult<Option<AuthCredential>> {
        let Some(bytes) = self.store.get(CREDENTIAL_ENTRY).await? else {
            return Ok(None);
        };
        match String::from_utf8(bytes) {
            Ok(token) => Ok(AuthCredential::new(token).ok()),
            Err(_) => {
                tracing::warn!("Stored credential is not UTF-8, ignoring");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, credential: &AuthCredential) -> IdentityResult<()> {
        self.store
            .set(CREDENTIAL_ENTRY, credential.expose().as_bytes().to_vec())
            .await?;
        Ok(())
    }

    pub async fn clear(&self) -> IdentityResult<()> {
        self.store.delete(CREDENTIAL_ENTRY).await?;
        Ok(())
    }
}
