//! Configuration management for Portcullis.
//!
//! Loaded from TOML. Every section has defaults, so a file only needs the keys
//! it wants to override.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CoreError;

/// Seven days, the default pre-expiry renewal margin.
pub const DEFAULT_RENEWAL_THRESHOLD_SECS: u64 = 7 * 24 * 60 * 60;

/// Default lifetime of a signed operation token.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 60;

/// Default timeout for certificate and device requests.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub certificate: CertificateConfig,
    pub token: TokenConfig,
    pub storage: StorageConfig,
}

/// How the ephemeral public key is encoded in certificate requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEncoding {
    /// RFC 4648 base64 with padding.
    #[default]
    Standard,
    /// RFC 4648 base64url without padding.
    UrlSafeNoPad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub operation_timeout_ms: u64,
    pub ephemeral_key_encoding: KeyEncoding,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.doordeck.com".to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            operation_timeout_ms: DEFAULT_TIMEOUT_MS,
            ephemeral_key_encoding: KeyEncoding::Standard,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Certificates are renewed once they are within this many seconds of expiry.
    pub renewal_threshold_secs: u64,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            renewal_threshold_secs: DEFAULT_RENEWAL_THRESHOLD_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub lifetime_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: DEFAULT_TOKEN_LIFETIME_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path. `None` keeps state in memory only.
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    /// Reject values that would make the client unusable.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.api.base_url.trim().is_empty() {
            return Err(CoreError::Config("api.base_url must not be empty".to_string()));
        }
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(CoreError::Config(format!(
                "api.base_url must be an http(s) URL, got {}",
                self.api.base_url
            )));
        }
        if self.api.request_timeout_ms == 0 || self.api.operation_timeout_ms == 0 {
            return Err(CoreError::Config("timeouts must be non-zero".to_string()));
        }
        if self.token.lifetime_secs == 0 {
            return Err(CoreError::Config(
                "token.lifetime_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
