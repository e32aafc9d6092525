//! Ephemeral identity keypair lifecycle.
//!
//! The keypair is generated once per device identity and persisted as
//! standard base64 under two fixed store entries. Certificates bind to its
//! public key, so it is never regenerated while a pair is stored.

use portcullis_core::KeyStore;
use portcullis_crypto::EphemeralKeyPair;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::IdentityResult;

/// Store key for the base64 public key.
pub const PUBLIC_KEY_ENTRY: &str = "ephemeral.public_key";

/// Store key for the base64 `seed || public` private key.
pub const PRIVATE_KEY_ENTRY: &str = "ephemeral.private_key";

/// Where a keypair returned by [`EphemeralIdentity::generate_or_load`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    Loaded,
    Generated,
}

/// Owner of the client's signing keypair.
#[derive(Clone)]
pub struct EphemeralIdentity {
    store: Arc<dyn KeyStore>,
    generation: Arc<Mutex<()>>,
}

impl EphemeralIdentity {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            generation: Arc::new(Mutex::new(())),
        }
    }

    /// Return the stored keypair, generating and persisting one if none exists.
    ///
    /// Concurrent first calls generate exactly once; later callers observe the
    /// stored pair.
    pub async fn generate_or_load(&self) -> IdentityResult<(EphemeralKeyPair, KeyOrigin)> {
        if let Some(keys) = self.current_keys().await? {
            return Ok((keys, KeyOrigin::Loaded));
        }

        let _guard = self.generation.lock().await;
        if let Some(keys) = self.current_keys().await? {
            debug!("Keypair generated by concurrent caller");
            return Ok((keys, KeyOrigin::Loaded));
        }

        let keys = EphemeralKeyPair::generate();
        let private = keys.encoded_private_key();
        // Private first: a public entry without its private half reads as absent.
        self.store
            .set(PRIVATE_KEY_ENTRY, private.as_bytes().to_vec())
            .await?;
        self.store
            .set(PUBLIC_KEY_ENTRY, keys.encoded_public_key().into_bytes())
            .await?;

        info!(public_key = %keys.encoded_public_key(), "Generated ephemeral keypair");
        Ok((keys, KeyOrigin::Generated))
    }

    /// Read the stored keypair without generating one.
    ///
    /// Missing or undecodable material yields `None`. Store failures are
    /// still reported.
    pub async fn current_keys(&self) -> IdentityResult<Option<EphemeralKeyPair>> {
        let public = self.store.get(PUBLIC_KEY_ENTRY).await?;
        let private = self.store.get(PRIVATE_KEY_ENTRY).await?;

        let (Some(public), Some(private)) = (public, private) else {
            return Ok(None);
        };

        let decoded = match (String::from_utf8(public), String::from_utf8(private)) {
            (Ok(public), Ok(private)) => {
                let private = zeroize::Zeroizing::new(private);
                EphemeralKeyPair::from_encoded(&public, &private)
            }
            _ => {
                warn!("Stored keypair is not UTF-8, treating as absent");
                return Ok(None);
            }
        };

        match decoded {
            Ok(keys) => Ok(Some(keys)),
            Err(e) => {
                warn!(error = %e, "Stored keypair is corrupt, treating as absent");
                Ok(None)
            }
        }
    }

    /// Whether a usable keypair is stored.
    pub async fn has_keys(&self) -> bool {
        matches!(self.current_keys().await, Ok(Some(_)))
    }

    /// Delete persisted key material.
    ///
    /// Crate-private: certificates bound to the old key must be evicted at the
    /// same time, which [`crate::TrustBootstrap::reset`] takes care of.
    pub(crate) async fn reset(&self) -> IdentityResult<()> {
        let _guard = self.generation.lock().await;
        self.store.delete(PUBLIC_KEY_ENTRY).await?;
        self.store.delete(PRIVATE_KEY_ENTRY).await?;
        info!("Ephemeral keypair deleted");
        Ok(())
    }
}
