//! Core functionality for the Portcullis door-access client.
//!
//! This crate provides the ambient pieces shared by the rest of the workspace:
//! error types, configuration, logging setup, the injectable clock, and the
//! persistent key-value store contract with its default backends.

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ApiConfig, CertificateConfig, Config, KeyEncoding, StorageConfig, TokenConfig};
pub use error::{CoreError, Error, Result};
pub use store::{KeyStore, MemoryKeyStore};

#[cfg(feature = "sqlite")]
pub use store::SqliteKeyStore;
