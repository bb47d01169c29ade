//! Google Cloud Storage authentication

use crate::registration::error::RegistrationError;
use cloud_storage::Client;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
}

pub struct StorageAuth;

impl StorageAuth {
    /// Validate the service account file and build a storage client from it.
    ///
    /// `cloud-storage` reads the key path from `SERVICE_ACCOUNT` when the first
    /// request is made, so the variable is set before the client exists.
    pub fn create_client(credentials_path: impl AsRef<Path>) -> Result<Client, RegistrationError> {
        let credentials_path = credentials_path.as_ref();

        let key_data = std::fs::read_to_string(credentials_path).map_err(|e| {
            RegistrationError::CredentialsFileError(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to read credentials file '{}': {}",
                    credentials_path.display(),
                    e
                ),
            ))
        })?;

        let key: ServiceAccountKey = serde_json::from_str(&key_data).map_err(|e| {
            RegistrationError::AuthError(format!("Failed to parse service account key: {}", e))
        })?;

        if key.private_key.is_empty() {
            return Err(RegistrationError::AuthError(
                "Service account key has no private key, signed URLs need one".to_string(),
            ));
        }

        std::env::set_var("SERVICE_ACCOUNT", credentials_path);
        info!("Storage client authenticated as {}", key.client_email);

        Ok(Client::default())
    }
}
