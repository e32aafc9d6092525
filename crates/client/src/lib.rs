//! Door-access client for Portcullis.
//!
//! Builds on `portcullis-identity` to sign device operations and deliver them
//! over HTTP:
//!
//! - [`DoorClient`]: application-facing facade
//! - [`OperationSigner`]: compact EdDSA tokens from the current certificate
//! - [`DeviceOperation`]: the operations a device accepts
//! - [`ApiClient`]: reqwest implementation of the issuing and device collaborators

pub mod client;
pub mod error;
pub mod executor;
pub mod http;
pub mod operations;
pub mod signer;

pub use client::DoorClient;
pub use error::ClientError;
pub use executor::{DeviceExecutor, ExecutionReceipt};
pub use http::{ApiClient, JWT_CONTENT_TYPE};
pub use operations::{DeviceOperation, ShareTarget, UnlockBetween, UserRole, Weekday};
pub use signer::OperationSigner;
