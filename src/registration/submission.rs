//! Registration submission: persist the form, then ask for an embedding

use crate::registration::error::RegistrationError;
use crate::registration::image_storage::ImageStorage;
use crate::registration::matcher::EmbeddingService;
use crate::registration::user_directory::UserDirectory;
use crate::registration::user_info::{Registration, RegistrationForm};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub success: bool,
    pub id: String,
    pub message: String,
}

pub struct SubmissionService {
    images: Arc<ImageStorage>,
    directory: Arc<UserDirectory>,
    embedder: Option<Arc<dyn EmbeddingService>>,
}

impl SubmissionService {
    pub fn new(
        images: Arc<ImageStorage>,
        directory: Arc<UserDirectory>,
        embedder: Option<Arc<dyn EmbeddingService>>,
    ) -> Self {
        Self {
            images,
            directory,
            embedder,
        }
    }

    pub fn directory(&self) -> &Arc<UserDirectory> {
        &self.directory
    }

    /// Persist a form whose photo has already been uploaded.
    pub async fn submit(&self, form: &RegistrationForm) -> Result<SubmitReceipt, RegistrationError> {
        let checked = form.validate()?;
        self.images.ensure_uploaded(&checked.photo_reference).await?;

        let record = self.directory.register(form).await?;
        self.spawn_embedding(&record);

        Ok(SubmitReceipt {
            success: true,
            id: record.id,
            message: "User registered successfully".to_string(),
        })
    }

    /// Fire-and-forget: the registration stands whatever the AI server says.
    fn spawn_embedding(&self, record: &Registration) {
        let Some(embedder) = self.embedder.clone() else {
            return;
        };
        let user_id = record.id.clone();
        tokio::spawn(async move {
            match embedder.request_embedding(&user_id).await {
                Ok(()) => info!("Embedding requested for {}", user_id),
                Err(e) => warn!("Embedding request for {} failed: {}", user_id, e),
            }
        });
    }

    /// Explicit embedding trigger for an existing registration.
    pub async fn request_embedding(&self, id: &str) -> Result<(), RegistrationError> {
        let record = self.directory.get(id).await?;
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            RegistrationError::ConfigError("no embedding service configured".to_string())
        })?;
        embedder.request_embedding(&record.id).await
    }
}
