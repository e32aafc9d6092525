//! Door client facade.
//!
//! [`DoorClient`] ties the trust bootstrap, the signer and the device
//! executor together behind the API an application calls.

use portcullis_core::{Clock, Config, KeyStore, MemoryKeyStore, SqliteKeyStore, SystemClock};
use portcullis_crypto::SignedOperation;
use portcullis_identity::{
    AuthCredential, Certificate, CertificateIssuer, CertificateOutcome, CertificateState,
    IdentityError, IdentityResult, InitOutcome, LedgerSettings, TrustBootstrap,
    VerificationMethod,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::ClientError;
use crate::executor::{DeviceExecutor, ExecutionReceipt};
use crate::http::ApiClient;
use crate::operations::{DeviceOperation, ShareTarget, UnlockBetween, UserRole};
use crate::signer::OperationSigner;

#[derive(Clone)]
pub struct DoorClient {
    bootstrap: TrustBootstrap,
    signer: OperationSigner,
    executor: Arc<dyn DeviceExecutor>,
    operation_timeout: Duration,
}

impl DoorClient {
    /// Build a client talking HTTP to `config.api.base_url`.
    ///
    /// State lives in SQLite when `storage.path` is set, in memory otherwise.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        config.validate()?;

        let store: Arc<dyn KeyStore> = match &config.storage.path {
            Some(path) => Arc::new(SqliteKeyStore::open(path)?),
            None => Arc::new(MemoryKeyStore::new()),
        };
        let api = Arc::new(ApiClient::new(&config.api)?);

        info!(base_url = %config.api.base_url, persistent = config.storage.path.is_some(), "Door client configured");
        Ok(Self::with_components(
            config,
            store,
            api.clone(),
            api,
            Arc::new(SystemClock),
        ))
    }

    pub fn with_components(
        config: &Config,
        store: Arc<dyn KeyStore>,
        issuer: Arc<dyn CertificateIssuer>,
        executor: Arc<dyn DeviceExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let bootstrap = TrustBootstrap::new(
            store,
            issuer,
            clock.clone(),
            LedgerSettings::from_config(config),
        );
        Self::from_bootstrap(config, bootstrap, executor, clock)
    }

    pub fn from_bootstrap(
        config: &Config,
        bootstrap: TrustBootstrap,
        executor: Arc<dyn DeviceExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let signer = OperationSigner::new(bootstrap.clone(), clock, config.token.lifetime_secs);
        Self {
            bootstrap,
            signer,
            executor,
            operation_timeout: config.api.operation_timeout(),
        }
    }

    /// Adopt `credential`, issuing a certificate unless the session is already usable.
    pub async fn init_identity(&self, credential: &str) -> IdentityResult<InitOutcome> {
        let credential = AuthCredential::new(credential)?;
        self.bootstrap.init(credential).await
    }

    pub async fn ensure_certificate(&self) -> IdentityResult<CertificateOutcome> {
        self.bootstrap.ensure_certificate().await
    }

    pub async fn sign(
        &self,
        device_id: &str,
        operation: &DeviceOperation,
    ) -> IdentityResult<SignedOperation> {
        self.signer.sign(device_id, operation).await
    }

    pub async fn submit_verification_code(&self, code: &str) -> IdentityResult<Certificate> {
        self.bootstrap.submit_verification_code(code).await
    }

    /// Delete keys and certificate. The stored credential is kept.
    pub async fn reset(&self) -> IdentityResult<()> {
        self.bootstrap.reset().await
    }

    pub async fn is_session_usable(&self, credential: &str) -> bool {
        match AuthCredential::new(credential) {
            Ok(credential) => self.bootstrap.is_session_usable(&credential).await,
            Err(_) => false,
        }
    }

    pub async fn verification_method(&self) -> IdentityResult<Option<VerificationMethod>> {
        self.bootstrap.verification_method().await
    }

    /// Lifecycle state of the stored account's certificate.
    pub async fn certificate_state(&self) -> IdentityResult<CertificateState> {
        let credential = self.bootstrap.credential().await?;
        self.bootstrap
            .ledger()
            .state(&credential.account_id())
            .await
    }

    /// Sign `operation` and deliver it to `device_id`.
    pub async fn execute(
        &self,
        device_id: &str,
        operation: DeviceOperation,
    ) -> IdentityResult<ExecutionReceipt> {
        let signed = self.signer.sign(device_id, &operation).await?;
        let credential = self.bootstrap.credential().await?;

        info!(device_id = %device_id, operation = operation.kind(), "Executing device operation");
        tokio::time::timeout(
            self.operation_timeout,
            self.executor
                .execute(&credential, device_id, signed.compact()),
        )
        .await
        .unwrap_or(Err(IdentityError::Timeout {
            operation: "device operation",
            after_ms: self.operation_timeout.as_millis() as u64,
        }))
    }

    pub async fn lock(&self, device_id: &str) -> IdentityResult<ExecutionReceipt> {
        self.execute(device_id, DeviceOperation::lock()).await
    }

    /// Unlock, optionally for `duration` seconds.
    pub async fn unlock(
        &self,
        device_id: &str,
        duration: Option<u64>,
    ) -> IdentityResult<ExecutionReceipt> {
        self.execute(device_id, DeviceOperation::unlock(duration))
            .await
    }

    pub async fn change_open_hours(
        &self,
        device_id: &str,
        window: UnlockBetween,
    ) -> IdentityResult<ExecutionReceipt> {
        self.execute(device_id, DeviceOperation::open_hours(window))
            .await
    }

    pub async fn change_unlock_time(
        &self,
        device_id: &str,
        seconds: u64,
    ) -> IdentityResult<ExecutionReceipt> {
        self.execute(device_id, DeviceOperation::unlock_time(seconds))
            .await
    }

    pub async fn share(
        &self,
        device_id: &str,
        target: &ShareTarget,
        role: UserRole,
        start: Option<u64>,
        end: Option<u64>,
    ) -> IdentityResult<ExecutionReceipt> {
        self.execute(device_id, DeviceOperation::share(target, role, start, end))
            .await
    }

    pub async fn change_role(
        &self,
        device_id: &str,
        target: &ShareTarget,
        role: UserRole,
    ) -> IdentityResult<ExecutionReceipt> {
        self.execute(device_id, DeviceOperation::change_role(target, role))
            .await
    }

    pub async fn remove_users(
        &self,
        device_id: &str,
        users: Vec<String>,
    ) -> IdentityResult<ExecutionReceipt> {
        self.execute(device_id, DeviceOperation::remove_users(users))
            .await
    }

    pub fn bootstrap(&self) -> &TrustBootstrap {
        &self.bootstrap
    }

    pub fn signer(&self) -> &OperationSigner {
        &self.signer
    }
}
