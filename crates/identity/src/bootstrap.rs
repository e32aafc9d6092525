//! Trust bootstrap: credential, keys and certificate wired together.
//!
//! [`TrustBootstrap`] is the entry point the client facade drives. It owns the
//! stored credential and keeps keys and certificates consistent with it:
//!
//! - re-initialising with the same credential and a usable session is a no-op
//! - initialising with a different account resets the previous account's keys
//!   and certificate before anything is issued
//! - [`TrustBootstrap::reset`] removes keys and certificates together

use portcullis_core::{Clock, KeyStore};
use std::sync::Arc;
use tracing::{debug, info};

use crate::certificate::{Certificate, CertificateOutcome, VerificationChallenge, VerificationMethod};
use crate::credential::{AuthCredential, CredentialStore};
use crate::ephemeral::EphemeralIdentity;
use crate::error::{IdentityError, IdentityResult};
use crate::issuer::CertificateIssuer;
use crate::ledger::{CertificateLedger, LedgerSettings};
use crate::session::SessionGate;
use crate::two_factor::TwoFactorFlow;
use crate::x509::{ExpiryParser, X509ExpiryParser};

/// Result of [`TrustBootstrap::init`].
#[derive(Debug, Clone, PartialEq)]
pub enum InitOutcome {
    /// The supplied credential already had a usable session.
    AlreadyInitialised,
    /// A valid certificate is now cached.
    Ready(Certificate),
    /// Issuance is waiting for a verification code.
    VerificationRequired(VerificationChallenge),
}

impl From<CertificateOutcome> for InitOutcome {
    fn from(outcome: CertificateOutcome) -> Self {
        match outcome {
            CertificateOutcome::Valid(cert) => InitOutcome::Ready(cert),
            CertificateOutcome::VerificationRequired(challenge) => {
                InitOutcome::VerificationRequired(challenge)
            }
        }
    }
}

#[derive(Clone)]
pub struct TrustBootstrap {
    credentials: CredentialStore,
    identity: EphemeralIdentity,
    ledger: CertificateLedger,
    gate: SessionGate,
    two_factor: TwoFactorFlow,
}

impl TrustBootstrap {
    /// Build with the `x509-parser` backed expiry parser.
    pub fn new(
        store: Arc<dyn KeyStore>,
        issuer: Arc<dyn CertificateIssuer>,
        clock: Arc<dyn Clock>,
        settings: LedgerSettings,
    ) -> Self {
        Self::with_components(store, issuer, Arc::new(X509ExpiryParser), clock, settings)
    }

    pub fn with_components(
        store: Arc<dyn KeyStore>,
        issuer: Arc<dyn CertificateIssuer>,
        parser: Arc<dyn ExpiryParser>,
        clock: Arc<dyn Clock>,
        settings: LedgerSettings,
    ) -> Self {
        let credentials = CredentialStore::new(store.clone());
        let identity = EphemeralIdentity::new(store.clone());
        let ledger = CertificateLedger::new(store, issuer, parser, clock, settings);
        let gate = SessionGate::new(identity.clone(), ledger.clone());
        let two_factor = TwoFactorFlow::new(identity.clone(), ledger.clone());

        Self {
            credentials,
            identity,
            ledger,
            gate,
            two_factor,
        }
    }

    /// Adopt `credential` and make sure it has a certificate.
    pub async fn init(&self, credential: AuthCredential) -> IdentityResult<InitOutcome> {
        let stored = self.credentials.load().await?;
        if self.gate.is_session_usable(stored.as_ref(), &credential).await {
            info!("Session already initialised");
            return Ok(InitOutcome::AlreadyInitialised);
        }

        if let Some(previous) = stored.as_ref() {
            let previous_account = previous.account_id();
            if previous_account != credential.account_id() {
                info!(previous = %previous_account, "Account changed, resetting identity");
                self.reset_account(&previous_account).await?;
            }
        }

        if self.identity.current_keys().await?.is_none() {
            // A certificate is only usable with the key it was issued for.
            debug!(account = %credential.account_id(), "No keys present, discarding cached certificate");
            self.ledger.reset(&credential.account_id()).await?;
        }

        self.credentials.save(&credential).await?;
        let outcome = self
            .ledger
            .ensure_certificate(&credential, &self.identity)
            .await?;
        Ok(outcome.into())
    }

    /// The stored credential.
    pub async fn credential(&self) -> IdentityResult<AuthCredential> {
        self.credentials
            .load()
            .await?
            .ok_or(IdentityError::MissingCredential)
    }

    /// Ensure a valid certificate for the stored credential.
    pub async fn ensure_certificate(&self) -> IdentityResult<CertificateOutcome> {
        let credential = self.credential().await?;
        self.ledger
            .ensure_certificate(&credential, &self.identity)
            .await
    }

    pub async fn submit_verification_code(&self, code: &str) -> IdentityResult<Certificate> {
        let credential = self.credential().await?;
        self.two_factor.submit(&credential, code).await
    }

    /// Channel of the outstanding verification code, if one was requested.
    pub async fn verification_method(&self) -> IdentityResult<Option<VerificationMethod>> {
        let credential = self.credential().await?;
        Ok(self.two_factor.pending_method(&credential).await)
    }

    pub async fn is_session_usable(&self, supplied: &AuthCredential) -> bool {
        match self.credentials.load().await {
            Ok(stored) => self.gate.is_session_usable(stored.as_ref(), supplied).await,
            Err(_) => false,
        }
    }

    pub async fn check_session(&self, supplied: &AuthCredential) -> IdentityResult<()> {
        let stored = self.credentials.load().await?;
        self.gate.check(stored.as_ref(), supplied).await
    }

    /// Delete keys and the stored account's certificate together.
    ///
    /// The credential itself is kept so the next call re-issues for it.
    pub async fn reset(&self) -> IdentityResult<()> {
        if let Some(credential) = self.credentials.load().await? {
            self.ledger.reset(&credential.account_id()).await?;
        }
        self.identity.reset().await?;
        info!("Identity reset");
        Ok(())
    }

    /// Reset the keys and certificate for one account.
    async fn reset_account(&self, account: &str) -> IdentityResult<()> {
        self.ledger.reset(account).await?;
        self.identity.reset().await
    }

    pub fn identity(&self) -> &EphemeralIdentity {
        &self.identity
    }

    pub fn ledger(&self) -> &CertificateLedger {
        &self.ledger
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    pub fn two_factor(&self) -> &TwoFactorFlow {
        &self.two_factor
    }
}
