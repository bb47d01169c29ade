//! Photo-backed user registration on top of cloud object storage

pub mod auth;
pub mod config;
pub mod error;
pub mod image_storage;
pub mod match_orchestrator;
pub mod matcher;
pub mod object_store;
pub mod submission;
pub mod user_directory;
pub mod user_info;

pub use auth::StorageAuth;
pub use config::{MatcherConfig, RegistrationConfig, StorageBackend};
pub use error::RegistrationError;
pub use image_storage::{ImageStorage, SignedUrl, UploadResult, SIGNED_URL_TTL};
pub use match_orchestrator::{MatchOrchestrator, MatchOutcome};
pub use matcher::{EmbeddingService, FaceMatcher, HttpAiClient, MatchReply, MatchedUser};
pub use object_store::{GcsObjectStore, MemoryObjectStore, ObjectMetadata, ObjectStore};
pub use submission::{SubmissionService, SubmitReceipt};
pub use user_directory::UserDirectory;
pub use user_info::{Gender, Registration, RegistrationForm};
