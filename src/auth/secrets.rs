//! Secret key storage
//!
//! Stores HMAC secret keys per server in ~/.config/resty/secrets.json

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A secret key remembered for one server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSecret {
    /// Base URL the key belongs to
    pub base_url: String,
    pub secret_key: String,
    /// When the key was last written (unix timestamp)
    pub updated_at: u64,
}

/// Secret store - manages persistence of signing keys
pub struct SecretStore {
    path: PathBuf,
}

impl SecretStore {
    /// Create store using default path (~/.config/resty/secrets.json)
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".into()))?
            .join("resty");

        std::fs::create_dir_all(&config_dir)
            .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;

        Ok(Self {
            path: config_dir.join("secrets.json"),
        })
    }

    /// Create store backed by an explicit file
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the secret key for a server
    pub fn load(&self, base_url: &str) -> Result<Option<String>> {
        Ok(self
            .read_all()?
            .into_iter()
            .find(|s| s.base_url == base_url)
            .map(|s| s.secret_key))
    }

    /// Save a key (updates existing or adds new)
    pub fn save(&self, base_url: &str, secret_key: &str) -> Result<()> {
        let mut all = self.read_all().unwrap_or_default();
        let entry = StoredSecret {
            base_url: base_url.to_string(),
            secret_key: secret_key.to_string(),
            updated_at: now_secs(),
        };

        if let Some(existing) = all.iter_mut().find(|s| s.base_url == base_url) {
            *existing = entry;
        } else {
            all.push(entry);
        }
        self.write_all(&all)
    }

    /// Remove the key for a server
    pub fn remove(&self, base_url: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut all = self.read_all()?;
        all.retain(|s| s.base_url != base_url);
        self.write_all(&all)
    }

    /// Get the secrets file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<StoredSecret>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Config(format!("Failed to read secrets: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))
    }

    fn write_all(&self, all: &[StoredSecret]) -> Result<()> {
        let content = serde_json::to_string_pretty(all)
            .map_err(|e| Error::Config(format!("Failed to serialize secrets: {}", e)))?;
        std::fs::write(&self.path, content)
            .map_err(|e| Error::Config(format!("Failed to write secrets: {}", e)))
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
