//! Driver configuration
//!
//! Defaults can be overridden through environment variables; explicit
//! values (CLI flags, builder calls) override both.

use crate::model::ChecksumEngine;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default server host
pub const DEFAULT_HOST: &str = "http://127.0.0.1";
/// Default server port
pub const DEFAULT_PORT: &str = "8000";
/// Default checksum algorithm name
pub const DEFAULT_CHECKSUM_ALGO: &str = "sha1";

/// Connection settings for one restAssured server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Scheme and host, e.g. `http://127.0.0.1`
    pub host: String,
    pub port: String,
    /// Checksum algorithm registry name
    pub checksum_algorithm: String,
    /// Request timeout in seconds, handed to the HTTP client unchanged
    pub timeout_secs: u64,
    /// HMAC secret used for request signing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT.to_string(),
            checksum_algorithm: DEFAULT_CHECKSUM_ALGO.to_string(),
            timeout_secs: 60,
            secret_key: None,
        }
    }
}

impl DriverConfig {
    /// Config for a host and port, other settings default.
    /// Empty host or port fall back to the defaults.
    pub fn new(host: &str, port: &str) -> Self {
        DriverConfig {
            host: non_empty(host, DEFAULT_HOST),
            port: non_empty(port, DEFAULT_PORT),
            ..Default::default()
        }
    }

    /// Create config from environment variables
    ///
    /// Reads `RESTY_HOST`, `RESTY_PORT`, `RESTY_CHECKSUM_ALGO`,
    /// `RESTY_TIMEOUT_SECS` and `RESTY_SECRET_KEY`.
    pub fn from_env() -> Self {
        let defaults = DriverConfig::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        DriverConfig {
            host: var("RESTY_HOST").unwrap_or(defaults.host),
            port: var("RESTY_PORT").unwrap_or(defaults.port),
            checksum_algorithm: var("RESTY_CHECKSUM_ALGO").unwrap_or(defaults.checksum_algorithm),
            timeout_secs: var("RESTY_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            secret_key: var("RESTY_SECRET_KEY"),
        }
    }

    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DriverConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that the checksum algorithm resolves
    pub fn validate(&self) -> Result<()> {
        ChecksumEngine::new(&self.checksum_algorithm)?;
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn with_checksum_algorithm(mut self, name: impl Into<String>) -> Self {
        self.checksum_algorithm = name.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_secret_key(mut self, key: impl Into<String>) -> Self {
        self.secret_key = Some(key.into());
        self
    }

    /// `<host>:<port>` with surrounding slashes stripped
    pub fn base_url(&self) -> String {
        format!(
            "{}:{}",
            non_empty(&self.host, DEFAULT_HOST).trim_matches('/'),
            non_empty(&self.port, DEFAULT_PORT).trim_matches('/')
        )
    }
}

fn non_empty(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.trim().to_string()
    }
}
