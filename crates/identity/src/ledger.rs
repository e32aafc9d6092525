//! Certificate ledger: issuance, validity, renewal and caching.
//!
//! The ledger owns every certificate the client holds, keyed by account. A
//! certificate is usable only when its whole chain parses and the leaf stays
//! valid for longer than the renewal threshold. Anything else is evicted and
//! re-issued on next use.
//!
//! # Single-flight issuance
//!
//! At most one issuance runs per account. Concurrent callers share the same
//! [`Shared`] future and observe the same outcome. The entry is removed when
//! the issuance finishes, whether it succeeded or not.
//!
//! # Step-up
//!
//! When the service answers an issuance request with "step-up required" the
//! ledger asks for a verification code to be sent, remembers the advertised
//! channel, and returns [`CertificateOutcome::VerificationRequired`]. The code
//! is later exchanged through [`CertificateLedger::complete_verification`].

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use portcullis_core::{Clock, Config, KeyEncoding, KeyStore};
use portcullis_crypto::encoding;
use portcullis_crypto::EphemeralKeyPair;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::certificate::{
    within_validity, Certificate, CertificateOutcome, CertificateState, Validity,
    VerificationChallenge, VerificationMethod,
};
use crate::credential::AuthCredential;
use crate::ephemeral::{EphemeralIdentity, KeyOrigin};
use crate::error::{IdentityError, IdentityResult};
use crate::issuer::{CertificateIssuer, IssuerError};
use crate::x509::ExpiryParser;

/// Prefix of per-account certificate entries in the key store.
pub const CERTIFICATE_ENTRY_PREFIX: &str = "certificate.";

const ISSUANCE: &str = "certificate issuance";
const STEP_UP: &str = "step-up request";
const VERIFICATION: &str = "verification check";

type IssuanceFuture = Shared<BoxFuture<'static, IdentityResult<CertificateOutcome>>>;

/// A certificate record as found in the cache, before any validity check.
enum CachedRecord {
    Readable(Certificate),
    Unreadable(String),
}

/// Tunables for the ledger.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub renewal_threshold_secs: u64,
    pub request_timeout: Duration,
    pub key_encoding: KeyEncoding,
}

impl LedgerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            renewal_threshold_secs: config.certificate.renewal_threshold_secs,
            request_timeout: config.api.request_timeout(),
            key_encoding: config.api.ephemeral_key_encoding,
        }
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Store key for `account`'s certificate.
pub fn certificate_entry(account: &str) -> String {
    format!("{}{}", CERTIFICATE_ENTRY_PREFIX, account)
}

struct LedgerInner {
    store: Arc<dyn KeyStore>,
    issuer: Arc<dyn CertificateIssuer>,
    parser: Arc<dyn ExpiryParser>,
    clock: Arc<dyn Clock>,
    settings: LedgerSettings,
    fast_cache: RwLock<HashMap<String, Certificate>>,
    pending_challenges: RwLock<HashMap<String, VerificationChallenge>>,
    in_flight: Mutex<HashMap<String, IssuanceFuture>>,
}

/// Per-account certificate cache and issuance driver.
#[derive(Clone)]
pub struct CertificateLedger {
    inner: Arc<LedgerInner>,
}

impl CertificateLedger {
    pub fn new(
        store: Arc<dyn KeyStore>,
        issuer: Arc<dyn CertificateIssuer>,
        parser: Arc<dyn ExpiryParser>,
        clock: Arc<dyn Clock>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                store,
                issuer,
                parser,
                clock,
                settings,
                fast_cache: RwLock::new(HashMap::new()),
                pending_challenges: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.inner.settings
    }

    /// Return a valid certificate for the credential's account, issuing one
    /// if the cached certificate is missing, unparseable or inside the
    /// renewal window.
    ///
    /// Keys are only generated or loaded when issuance is needed.
    pub async fn ensure_certificate(
        &self,
        credential: &AuthCredential,
        identity: &EphemeralIdentity,
    ) -> IdentityResult<CertificateOutcome> {
        let account = credential.account_id();

        if let Some(cert) = self.inner.load_valid(&account).await? {
            debug!(account = %account, "Using cached certificate");
            return Ok(CertificateOutcome::Valid(cert));
        }

        let issuance = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&account) {
                Some(existing) => {
                    debug!(account = %account, "Joining in-flight issuance");
                    existing.clone()
                }
                None => {
                    let issuance = self.start_issuance(credential.clone(), identity.clone(), &account);
                    in_flight.insert(account.clone(), issuance.clone());
                    // Drive to completion even if every caller goes away, so a
                    // late result still lands in the cache.
                    tokio::spawn(issuance.clone());
                    issuance
                }
            }
        };

        issuance.await
    }

    fn start_issuance(
        &self,
        credential: AuthCredential,
        identity: EphemeralIdentity,
        account: &str,
    ) -> IssuanceFuture {
        let inner = self.inner.clone();
        let account = account.to_string();

        async move {
            let outcome = inner.run_issuance(&credential, &identity, &account).await;
            inner.in_flight.lock().await.remove(&account);
            outcome
        }
        .boxed()
        .shared()
    }

    /// Exchange a verification code for a certificate.
    ///
    /// The code is signed exactly as entered with the identity's private key.
    /// Never retried.
    pub async fn complete_verification(
        &self,
        credential: &AuthCredential,
        code: &str,
        keys: &EphemeralKeyPair,
    ) -> IdentityResult<Certificate> {
        let account = credential.account_id();
        if code.trim().is_empty() {
            return Err(IdentityError::VerificationFailed {
                reason: "verification code is empty".to_string(),
            });
        }

        let signature = encoding::encode_standard(&keys.sign(code.as_bytes()));
        let result = self
            .inner
            .call(self.inner.issuer.check_verification(credential, &signature))
            .await;

        let cert = match result {
            Ok(cert) => cert,
            Err(IssuerError::Timeout) => return Err(self.inner.timeout_error(VERIFICATION)),
            Err(e) => {
                warn!(account = %account, error = %e, "Verification code rejected");
                return Err(IdentityError::VerificationFailed {
                    reason: e.to_string(),
                });
            }
        };

        let cert = self.inner.accept_issued(&account, cert).await?;
        self.inner.pending_challenges.write().await.remove(&account);
        info!(account = %account, "Verification completed, certificate issued");
        Ok(cert)
    }

    /// Cached certificate for `account` if it passes validity; evicts it otherwise.
    pub async fn load_valid(&self, account: &str) -> IdentityResult<Option<Certificate>> {
        self.inner.load_valid(account).await
    }

    /// Like [`Self::load_valid`] but leaves both cache tiers untouched.
    pub async fn peek_valid(&self, account: &str) -> IdentityResult<Option<Certificate>> {
        match self.inner.read_record(account).await? {
            Some(CachedRecord::Readable(cert)) => {
                Ok(self.inner.evaluate(&cert).is_valid().then_some(cert))
            }
            Some(CachedRecord::Unreadable(_)) | None => Ok(None),
        }
    }

    /// Check a certificate against the clock and the renewal threshold.
    pub fn evaluate(&self, cert: &Certificate) -> Validity {
        self.inner.evaluate(cert)
    }

    /// Current lifecycle state of `account`'s certificate. Read-only.
    pub async fn state(&self, account: &str) -> IdentityResult<CertificateState> {
        if self.inner.in_flight.lock().await.contains_key(account) {
            return Ok(CertificateState::Pending);
        }
        if let Some(challenge) = self.pending_challenge(account).await {
            return Ok(CertificateState::AwaitingVerification {
                method: challenge.method,
            });
        }
        let cert = match self.inner.read_record(account).await? {
            Some(CachedRecord::Readable(cert)) => cert,
            Some(CachedRecord::Unreadable(_)) => return Ok(CertificateState::Invalid),
            None => return Ok(CertificateState::Absent),
        };
        Ok(match self.inner.evaluate(&cert) {
            Validity::Valid { not_after } => CertificateState::Valid { not_after },
            Validity::ExpiringSoon { not_after } => CertificateState::ExpiringSoon { not_after },
            Validity::Malformed(_) => CertificateState::Invalid,
        })
    }

    /// Most recent unanswered step-up challenge for `account`.
    pub async fn pending_challenge(&self, account: &str) -> Option<VerificationChallenge> {
        self.inner
            .pending_challenges
            .read()
            .await
            .get(account)
            .cloned()
    }

    /// Evict `account`'s certificate from memory and the store.
    pub async fn reset(&self, account: &str) -> IdentityResult<()> {
        self.inner.pending_challenges.write().await.remove(account);
        self.inner.evict(account).await
    }
}

impl LedgerInner {
    async fn run_issuance(
        &self,
        credential: &AuthCredential,
        identity: &EphemeralIdentity,
        account: &str,
    ) -> IdentityResult<CertificateOutcome> {
        // A previous flight may have finished between the caller's check and
        // this one starting.
        if let Some(cert) = self.load_valid(account).await? {
            return Ok(CertificateOutcome::Valid(cert));
        }

        let (keys, origin) = identity.generate_or_load().await?;
        if origin == KeyOrigin::Generated {
            debug!(account = %account, "Issuing certificate for newly generated key");
        }
        let ephemeral_key = encoding::encode_public_key(&keys.public_key(), self.settings.key_encoding);

        info!(account = %account, "Requesting certificate");
        match self
            .call(self.issuer.request_certificate(credential, &ephemeral_key))
            .await
        {
            Ok(cert) => {
                let cert = self.accept_issued(account, cert).await?;
                self.pending_challenges.write().await.remove(account);
                info!(account = %account, user_id = %cert.user_id, "Certificate issued");
                Ok(CertificateOutcome::Valid(cert))
            }
            Err(IssuerError::StepUpRequired) => {
                self.begin_step_up(credential, account, &ephemeral_key)
                    .await
            }
            Err(IssuerError::RateLimited) => {
                warn!(account = %account, "Certificate issuance rate limited");
                Err(IdentityError::RateLimited)
            }
            Err(IssuerError::Timeout) => Err(self.timeout_error(ISSUANCE)),
            Err(e) => {
                warn!(account = %account, error = %e, "Certificate issuance failed");
                Err(IdentityError::CertificateIssuanceFailed {
                    status: e.status(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn begin_step_up(
        &self,
        credential: &AuthCredential,
        account: &str,
        ephemeral_key: &str,
    ) -> IdentityResult<CertificateOutcome> {
        info!(account = %account, "Step-up verification required");

        match self
            .call(self.issuer.request_step_up(credential, ephemeral_key))
            .await
        {
            Ok(challenge) => {
                if matches!(&challenge.method, VerificationMethod::Other(m) if m.trim().is_empty())
                {
                    return Err(IdentityError::CertificateIssuanceFailed {
                        status: None,
                        reason: "step-up response carried no verification method".to_string(),
                    });
                }
                info!(account = %account, method = %challenge.method, "Verification code sent");
                self.pending_challenges
                    .write()
                    .await
                    .insert(account.to_string(), challenge.clone());
                Ok(CertificateOutcome::VerificationRequired(challenge))
            }
            Err(IssuerError::RateLimited) => {
                warn!(account = %account, "Too many pending verifications");
                Err(IdentityError::RateLimited)
            }
            Err(IssuerError::Timeout) => Err(self.timeout_error(STEP_UP)),
            Err(e) => {
                warn!(account = %account, error = %e, "Step-up request failed");
                Err(IdentityError::CertificateIssuanceFailed {
                    status: e.status(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Validate a freshly issued certificate and cache it.
    async fn accept_issued(&self, account: &str, cert: Certificate) -> IdentityResult<Certificate> {
        match self.evaluate(&cert) {
            Validity::Malformed(reason) => {
                warn!(account = %account, reason = %reason, "Issued certificate does not parse");
                return Err(IdentityError::CertificateIssuanceFailed {
                    status: None,
                    reason: format!("issued certificate is malformed: {}", reason),
                });
            }
            Validity::ExpiringSoon { not_after } => {
                warn!(account = %account, not_after, "Issued certificate is already inside the renewal window");
            }
            Validity::Valid { .. } => {}
        }

        self.store_certificate(account, &cert).await?;
        Ok(cert)
    }

    fn evaluate(&self, cert: &Certificate) -> Validity {
        match self.parser.parse_leaf_expiry(&cert.certificate_chain) {
            Ok(not_after) => {
                let now = self.clock.now_unix();
                if within_validity(now, not_after, self.settings.renewal_threshold_secs) {
                    Validity::Valid { not_after }
                } else {
                    Validity::ExpiringSoon { not_after }
                }
            }
            Err(e) => Validity::Malformed(e.to_string()),
        }
    }

    async fn load_valid(&self, account: &str) -> IdentityResult<Option<Certificate>> {
        let Some(cert) = self.load_cached(account).await? else {
            return Ok(None);
        };

        match self.evaluate(&cert) {
            Validity::Valid { .. } => Ok(Some(cert)),
            Validity::ExpiringSoon { not_after } => {
                info!(account = %account, not_after, "Cached certificate due for renewal, evicting");
                self.evict(account).await?;
                Ok(None)
            }
            Validity::Malformed(reason) => {
                warn!(account = %account, reason = %reason, "Cached certificate malformed, evicting");
                self.evict(account).await?;
                Ok(None)
            }
        }
    }

    /// Promotes a store hit into the fast cache and deletes an unreadable record.
    async fn load_cached(&self, account: &str) -> IdentityResult<Option<Certificate>> {
        if let Some(cert) = self.fast_cache.read().await.get(account) {
            return Ok(Some(cert.clone()));
        }

        match self.read_record(account).await? {
            Some(CachedRecord::Readable(cert)) => {
                self.fast_cache
                    .write()
                    .await
                    .insert(account.to_string(), cert.clone());
                Ok(Some(cert))
            }
            Some(CachedRecord::Unreadable(reason)) => {
                warn!(account = %account, error = %reason, "Cached certificate record unreadable, discarding");
                self.store.delete(&certificate_entry(account)).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn read_record(&self, account: &str) -> IdentityResult<Option<CachedRecord>> {
        if let Some(cert) = self.fast_cache.read().await.get(account) {
            return Ok(Some(CachedRecord::Readable(cert.clone())));
        }

        let Some(bytes) = self.store.get(&certificate_entry(account)).await? else {
            return Ok(None);
        };
        Ok(Some(match serde_json::from_slice::<Certificate>(&bytes) {
            Ok(cert) => CachedRecord::Readable(cert),
            Err(e) => CachedRecord::Unreadable(e.to_string()),
        }))
    }

    async fn store_certificate(&self, account: &str, cert: &Certificate) -> IdentityResult<()> {
        let bytes = serde_json::to_vec(cert)
            .map_err(|e| IdentityError::Store(format!("serializing certificate: {}", e)))?;
        self.store.set(&certificate_entry(account), bytes).await?;
        self.fast_cache
            .write()
            .await
            .insert(account.to_string(), cert.clone());
        Ok(())
    }

    async fn evict(&self, account: &str) -> IdentityResult<()> {
        self.fast_cache.write().await.remove(account);
        self.store.delete(&certificate_entry(account)).await?;
        Ok(())
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, IssuerError>>,
    ) -> Result<T, IssuerError> {
        tokio::time::timeout(self.settings.request_timeout, request)
            .await
            .unwrap_or(Err(IssuerError::Timeout))
    }

    fn timeout_error(&self, operation: &'static str) -> IdentityError {
        IdentityError::Timeout {
            operation,
            after_ms: self.settings.request_timeout.as_millis() as u64,
        }
    }
}
