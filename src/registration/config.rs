//! Configuration for user registration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Google Cloud Storage bucket
    Gcs,
    /// Process-local store, contents are lost on exit
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcs" => Ok(StorageBackend::Gcs),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub backend: StorageBackend,
    /// Path to the service account credentials JSON file
    pub credentials_path: PathBuf,
    pub bucket_name: String,
    /// Prefix for uploaded photos, `<prefix>/<label>/avatar-<ts>.<ext>`
    pub users_prefix: String,
    /// Prefix for registration documents and their unique indexes
    pub records_prefix: String,
}

impl RegistrationConfig {
    pub fn new(credentials_path: impl Into<PathBuf>, bucket_name: impl Into<String>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            bucket_name: bucket_name.into(),
            ..Self::default()
        }
    }

    pub fn in_memory(bucket_name: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Memory,
            bucket_name: bucket_name.into(),
            ..Self::default()
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Gcs,
            credentials_path: PathBuf::from("credentials/service-account.json"),
            bucket_name: "face-enroll".to_string(),
            users_prefix: "users".to_string(),
            records_prefix: "registrations".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Base URL of the AI server exposing `/match` and `/embed`
    pub base_url: String,
    pub timeout_ms: u64,
    /// Send an embedding request after every successful registration
    pub embed_on_register: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 10_000,
            embed_on_register: true,
        }
    }
}
