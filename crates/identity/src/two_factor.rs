//! Step-up verification completion.

use tracing::info;

use crate::certificate::{Certificate, VerificationMethod};
use crate::credential::AuthCredential;
use crate::ephemeral::EphemeralIdentity;
use crate::error::{IdentityError, IdentityResult};
use crate::ledger::CertificateLedger;

/// Completes an issuance that stopped at a verification challenge.
#[derive(Clone)]
pub struct TwoFactorFlow {
    identity: EphemeralIdentity,
    ledger: CertificateLedger,
}

impl TwoFactorFlow {
    pub fn new(identity: EphemeralIdentity, ledger: CertificateLedger) -> Self {
        Self { identity, ledger }
    }

    /// Submit the code the user received. Uses the current keypair; there is
    /// nothing to prove possession of without one.
    pub async fn submit(
        &self,
        credential: &AuthCredential,
        code: &str,
    ) -> IdentityResult<Certificate> {
        let keys = self
            .identity
            .current_keys()
            .await?
            .ok_or(IdentityError::KeysUnavailable)?;

        if let Some(method) = self.pending_method(credential).await {
            info!(method = %method, "Submitting verification code");
        }
        self.ledger
            .complete_verification(credential, code, &keys)
            .await
    }

    /// Channel the outstanding code was sent through, if any.
    pub async fn pending_method(&self, credential: &AuthCredential) -> Option<VerificationMethod> {
        self.ledger
            .pending_challenge(&credential.account_id())
            .await
            .map(|challenge| challenge.method)
    }
}
