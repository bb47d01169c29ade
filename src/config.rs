//! Application configuration: TOML file plus environment overrides

use crate::registration::{MatcherConfig, RegistrationConfig, RegistrationError, StorageBackend};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub registration: RegistrationConfig,
    pub matcher: MatcherConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            registration: RegistrationConfig::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read `path` if it exists, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistrationError> {
        let path = path.as_ref();
        let mut cfg = if path.exists() {
            let cfg_text = std::fs::read_to_string(path)?;
            Self::from_toml(&cfg_text)?
        } else {
            warn!("Config file {} not found, using defaults", path.display());
            Self::default()
        };

        cfg.apply_env(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> Result<Self, RegistrationError> {
        toml::from_str(text)
            .map_err(|e| RegistrationError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Overrides: BIND_ADDR, STORAGE_BACKEND, BUCKET_NAME,
    /// GOOGLE_APPLICATION_CREDENTIALS, AI_SERVER.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), RegistrationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = var("BIND_ADDR") {
            info!("BIND_ADDR set, binding to {}", addr);
            self.bind_addr = addr;
        }
        if let Some(backend) = var("STORAGE_BACKEND") {
            self.registration.backend = backend
                .parse::<StorageBackend>()
                .map_err(RegistrationError::ConfigError)?;
        }
        if let Some(bucket) = var("BUCKET_NAME") {
            self.registration.bucket_name = bucket;
        }
        if let Some(credentials) = var("GOOGLE_APPLICATION_CREDENTIALS") {
            self.registration.credentials_path = credentials.into();
        }
        if let Some(server) = var("AI_SERVER") {
            self.matcher.base_url = server;
        }
        Ok(())
    }
}
