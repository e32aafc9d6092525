//! Device execution collaborator.

use async_trait::async_trait;
use portcullis_identity::{AuthCredential, IdentityResult};

/// What the device service returned for an accepted operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReceipt {
    pub device_id: String,
    pub status: u16,
    /// Response body, when the service sent JSON.
    pub body: Option<serde_json::Value>,
}

/// Delivers a compact signed token to a device.
#[async_trait]
pub trait DeviceExecutor: Send + Sync {
    async fn execute(
        &self,
        credential: &AuthCredential,
        device_id: &str,
        token: &str,
    ) -> IdentityResult<ExecutionReceipt>;
}
