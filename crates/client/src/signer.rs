//! Signed device operations.
//!
//! Every token is built from the certificate the ledger currently considers
//! valid. A lapsed certificate is re-issued transparently; when issuance
//! needs a verification code, signing fails with
//! [`IdentityError::VerificationRequired`] instead of using stale material.

use portcullis_core::Clock;
use portcullis_crypto::{new_nonce, EphemeralKeyPair, OperationClaims, SignedOperation};
use portcullis_identity::{
    AuthCredential, Certificate, CertificateOutcome, IdentityError, IdentityResult,
    TrustBootstrap,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::operations::DeviceOperation;

#[derive(Clone)]
pub struct OperationSigner {
    bootstrap: TrustBootstrap,
    clock: Arc<dyn Clock>,
    lifetime_secs: u64,
}

impl OperationSigner {
    pub fn new(bootstrap: TrustBootstrap, clock: Arc<dyn Clock>, lifetime_secs: u64) -> Self {
        Self {
            bootstrap,
            clock,
            lifetime_secs,
        }
    }

    /// Sign `operation` for `device_id` with a fresh nonce at the current time.
    pub async fn sign(
        &self,
        device_id: &str,
        operation: &DeviceOperation,
    ) -> IdentityResult<SignedOperation> {
        self.sign_at(device_id, operation, self.clock.now_unix(), new_nonce())
            .await
    }

    /// Sign with an explicit issue time and nonce. Deterministic for fixed inputs.
    pub async fn sign_at(
        &self,
        device_id: &str,
        operation: &DeviceOperation,
        issued_at: u64,
        nonce: String,
    ) -> IdentityResult<SignedOperation> {
        let credential = self.bootstrap.credential().await?;
        let (certificate, keys) = self.signing_material(&credential).await?;

        let claim = operation.to_claim().map_err(|e| {
            IdentityError::InvalidState(format!("operation does not serialise: {}", e))
        })?;
        let claims = OperationClaims::new(
            certificate.user_id,
            device_id,
            claim,
            issued_at,
            self.lifetime_secs,
            nonce,
        );

        let signed = SignedOperation::sign(&keys, certificate.certificate_chain, claims)?;
        debug!(device_id = %device_id, operation = operation.kind(), jti = %signed.claims().jti, "Signed operation");
        Ok(signed)
    }

    async fn signing_material(
        &self,
        credential: &AuthCredential,
    ) -> IdentityResult<(Certificate, EphemeralKeyPair)> {
        let certificate = self.valid_certificate(credential).await?;
        if let Some(keys) = self.bootstrap.identity().current_keys().await? {
            return Ok((certificate, keys));
        }

        // The certificate is bound to a key that no longer exists.
        warn!("Certificate cached without its keypair, re-issuing");
        self.bootstrap
            .ledger()
            .reset(&credential.account_id())
            .await?;
        let certificate = self.valid_certificate(credential).await?;
        let keys = self
            .bootstrap
            .identity()
            .current_keys()
            .await?
            .ok_or(IdentityError::KeysUnavailable)?;
        Ok((certificate, keys))
    }

    async fn valid_certificate(&self, credential: &AuthCredential) -> IdentityResult<Certificate> {
        match self
            .bootstrap
            .ledger()
            .ensure_certificate(credential, self.bootstrap.identity())
            .await?
        {
            CertificateOutcome::Valid(certificate) => Ok(certificate),
            CertificateOutcome::VerificationRequired(challenge) => {
                Err(IdentityError::VerificationRequired {
                    method: challenge.method,
                })
            }
        }
    }
}
