//! Test utilities for integration tests

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use portcullis_client::{DeviceExecutor, DoorClient, ExecutionReceipt};
use portcullis_core::{Clock, Config, KeyStore, ManualClock, MemoryKeyStore, SystemClock};
use portcullis_identity::{
    AuthCredential, Certificate, CertificateIssuer, IdentityResult, IssuerError,
    VerificationChallenge,
};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const USER_ID: &str = "user-1";
pub const DAY: u64 = 24 * 60 * 60;

/// Current Unix time in seconds
pub fn now_unix() -> u64 {
    SystemClock.now_unix()
}

/// Self-signed base64 DER certificate expiring at `not_after` (Unix seconds)
pub fn mint_certificate(not_after: u64) -> String {
    let key_pair = KeyPair::generate().unwrap();
    let mut params = CertificateParams::default();
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, "portcullis-integration");
    params.not_before = time::OffsetDateTime::from_unix_timestamp((now_unix() - DAY) as i64).unwrap();
    params.not_after = time::OffsetDateTime::from_unix_timestamp(not_after as i64).unwrap();
    let cert = params.self_signed(&key_pair).unwrap();
    STANDARD.encode(cert.der())
}

/// Certificate with a two-element chain whose leaf expires `days` from now
pub fn certificate_valid_for(days: u64) -> Certificate {
    let not_after = now_unix() + days * DAY;
    let raw = serde_json::json!({
        "certificateChain": [mint_certificate(not_after), mint_certificate(not_after + 365 * DAY)],
        "userId": USER_ID,
    });
    Certificate::from_payload(raw).unwrap()
}

/// Unsigned JWT naming `email`, enough for account derivation
pub fn jwt_for(email: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "email": email }).to_string());
    format!("{}.{}.signature", header, payload)
}

/// Scripted in-process certificate authority
#[derive(Default)]
pub struct FakeIssuer {
    issued: Mutex<VecDeque<Result<Certificate, IssuerError>>>,
    step_up: Mutex<VecDeque<Result<VerificationChallenge, IssuerError>>>,
    verified: Mutex<VecDeque<Result<Certificate, IssuerError>>>,
    delay: Mutex<Option<Duration>>,
    pub issue_calls: AtomicUsize,
    pub step_up_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub ephemeral_keys: Mutex<Vec<String>>,
    pub verification_signatures: Mutex<Vec<String>>,
}

impl FakeIssuer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_issued(&self, response: Result<Certificate, IssuerError>) {
        self.issued.lock().unwrap().push_back(response);
    }

    pub fn push_step_up(&self, response: Result<VerificationChallenge, IssuerError>) {
        self.step_up.lock().unwrap().push_back(response);
    }

    pub fn push_verified(&self, response: Result<Certificate, IssuerError>) {
        self.verified.lock().unwrap().push_back(response);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn issue_count(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn step_up_count(&self) -> usize {
        self.step_up_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateIssuer for FakeIssuer {
    async fn request_certificate(
        &self,
        _credential: &AuthCredential,
        ephemeral_key: &str,
    ) -> Result<Certificate, IssuerError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        self.ephemeral_keys
            .lock()
            .unwrap()
            .push(ephemeral_key.to_string());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.issued.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(certificate_valid_for(30)))
    }

    async fn request_step_up(
        &self,
        _credential: &AuthCredential,
        _ephemeral_key: &str,
    ) -> Result<VerificationChallenge, IssuerError> {
        self.step_up_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.step_up.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(VerificationChallenge::new("sms")))
    }

    async fn check_verification(
        &self,
        _credential: &AuthCredential,
        verification_signature: &str,
    ) -> Result<Certificate, IssuerError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verification_signatures
            .lock()
            .unwrap()
            .push(verification_signature.to_string());
        let scripted = self.verified.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(certificate_valid_for(30)))
    }
}

/// Device executor that records every token it receives
#[derive(Default)]
pub struct RecordingExecutor {
    pub delivered: Mutex<Vec<(String, String)>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn tokens(&self) -> Vec<(String, String)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceExecutor for RecordingExecutor {
    async fn execute(
        &self,
        _credential: &AuthCredential,
        device_id: &str,
        token: &str,
    ) -> IdentityResult<ExecutionReceipt> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.delivered
            .lock()
            .unwrap()
            .push((device_id.to_string(), token.to_string()));
        Ok(ExecutionReceipt {
            device_id: device_id.to_string(),
            status: 200,
            body: None,
        })
    }
}

/// A client wired to in-process fakes
pub struct Harness {
    pub client: DoorClient,
    pub issuer: Arc<FakeIssuer>,
    pub executor: Arc<RecordingExecutor>,
    pub store: Arc<dyn KeyStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Config::default_config(), Arc::new(MemoryKeyStore::new()))
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemoryKeyStore::new()))
    }

    pub fn with_store(config: Config, store: Arc<dyn KeyStore>) -> Self {
        let _ = portcullis_core::logging::init();

        let issuer = FakeIssuer::new();
        let executor = RecordingExecutor::new();
        let clock = Arc::new(ManualClock::new(now_unix()));
        let client = DoorClient::with_components(
            &config,
            store.clone(),
            issuer.clone(),
            executor.clone(),
            clock.clone(),
        );

        Self {
            client,
            issuer,
            executor,
            store,
            clock,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
