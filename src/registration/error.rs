//! Error types for user registration

use crate::capture::CaptureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Failed to read credentials file: {0}")]
    CredentialsFileError(#[from] std::io::Error),

    #[error("Failed to parse document: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Upload failed: {0}")]
    UploadFailure(String),

    #[error("No matching user found: {0}")]
    MatchNotFound(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Registration already exists: {0}")]
    AlreadyExists(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    ValidationError(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl From<reqwest::Error> for RegistrationError {
    fn from(e: reqwest::Error) -> Self {
        RegistrationError::TransportFailure(e.to_string())
    }
}
