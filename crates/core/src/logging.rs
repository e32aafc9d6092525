//! Structured logging for Portcullis.
//!
//! Secrets (bearer credentials, private keys, verification codes) are never
//! passed to tracing macros anywhere in the workspace.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::CoreError;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a human-readable subscriber.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
///
/// # Example
/// ```no_run
/// use portcullis_core::logging;
///
/// logging::init().expect("logging");
/// tracing::info!("client started");
/// ```
pub fn init() -> Result<(), CoreError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))
}

/// Install a JSON subscriber for log aggregation.
pub fn init_json() -> Result<(), CoreError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))
}
