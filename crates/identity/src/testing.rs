//! In-process fakes shared by the unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::certificate::{Certificate, VerificationChallenge};
use crate::credential::AuthCredential;
use crate::issuer::{CertificateIssuer, IssuerError};
use crate::x509::{CertificateParseError, ExpiryParser};

pub(crate) const NOW: u64 = 1_700_000_000;
pub(crate) const DAY: u64 = 24 * 60 * 60;

/// Chain elements of the form `exp:<unix>`.
pub(crate) struct FakeParser;

impl ExpiryParser for FakeParser {
    fn parse_leaf_expiry(&self, chain: &[String]) -> Result<i64, CertificateParseError> {
        let leaf = chain.first().ok_or(CertificateParseError::EmptyChain)?;
        leaf.strip_prefix("exp:")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| CertificateParseError::Parse {
                index: 0,
                reason: "not a fake certificate".to_string(),
            })
    }
}

pub(crate) fn cert_expiring_at(not_after: u64) -> Certificate {
    Certificate {
        certificate_chain: vec![format!("exp:{}", not_after)],
        user_id: "user-1".to_string(),
        raw: serde_json::Value::Null,
    }
}

#[derive(Default)]
pub(crate) struct FakeIssuer {
    pub issued: Mutex<VecDeque<Result<Certificate, IssuerError>>>,
    pub step_up: Mutex<VecDeque<Result<VerificationChallenge, IssuerError>>>,
    pub verified: Mutex<VecDeque<Result<Certificate, IssuerError>>>,
    pub verification_signatures: Mutex<Vec<String>>,
    pub issue_calls: AtomicUsize,
    pub step_up_calls: AtomicUsize,
    pub delay: Option<Duration>,
}

#[async_trait]
impl CertificateIssuer for FakeIssuer {
    async fn request_certificate(
        &self,
        _credential: &AuthCredential,
        _ephemeral_key: &str,
    ) -> Result<Certificate, IssuerError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.issued
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(cert_expiring_at(NOW + 30 * DAY)))
    }

    async fn request_step_up(
        &self,
        _credential: &AuthCredential,
        _ephemeral_key: &str,
    ) -> Result<VerificationChallenge, IssuerError> {
        self.step_up_calls.fetch_add(1, Ordering::SeqCst);
        self.step_up
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(VerificationChallenge::new("sms")))
    }

    async fn check_verification(
        &self,
        _credential: &AuthCredential,
        verification_signature: &str,
    ) -> Result<Certificate, IssuerError> {
        self.verification_signatures
            .lock()
            .await
            .push(verification_signature.to_string());
        self.verified
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(cert_expiring_at(NOW + 30 * DAY)))
    }
}

