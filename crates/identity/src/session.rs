//! Session usability decision.

use tracing::debug;

use crate::credential::AuthCredential;
use crate::ephemeral::EphemeralIdentity;
use crate::error::{IdentityError, IdentityResult};
use crate::ledger::CertificateLedger;

/// Decides whether an existing session can be reused as-is.
///
/// Read-only: never issues, generates or evicts.
#[derive(Clone)]
pub struct SessionGate {
    identity: EphemeralIdentity,
    ledger: CertificateLedger,
}

impl SessionGate {
    pub fn new(identity: EphemeralIdentity, ledger: CertificateLedger) -> Self {
        Self { identity, ledger }
    }

    /// True iff `supplied` matches the stored credential, keys exist, and the
    /// account holds a certificate that passes validity.
    pub async fn is_session_usable(
        &self,
        stored: Option<&AuthCredential>,
        supplied: &AuthCredential,
    ) -> bool {
        match self.check(stored, supplied).await {
            Ok(()) => true,
            Err(reason) => {
                debug!(reason = %reason, "Session not usable");
                false
            }
        }
    }

    /// Like [`Self::is_session_usable`], reporting the first failed condition.
    pub async fn check(
        &self,
        stored: Option<&AuthCredential>,
        supplied: &AuthCredential,
    ) -> IdentityResult<()> {
        let stored = stored.ok_or(IdentityError::MissingCredential)?;
        if stored != supplied {
            return Err(IdentityError::SessionCredentialMismatch);
        }
        if self.identity.current_keys().await?.is_none() {
            return Err(IdentityError::KeysUnavailable);
        }
        if self
            .ledger
            .peek_valid(&supplied.account_id())
            .await?
            .is_none()
        {
            return Err(IdentityError::InvalidState(
                "no valid certificate cached".to_string(),
            ));
        }
        Ok(())
    }
}
