//! Photo uploads and signed read URLs
//! Structure: users/{label}/avatar-{timestamp}.{ext}

use crate::registration::error::RegistrationError;
use crate::registration::object_store::{ObjectMetadata, ObjectStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifetime of every signed read URL.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(60 * 60);

const DEFAULT_EXTENSION: &str = "jpg";
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const ANONYMOUS_LABEL: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl UploadResult {
    fn stored(destination: String) -> Self {
        Self {
            success: true,
            destination: Some(destination),
        }
    }

    fn failed() -> Self {
        Self {
            success: false,
            destination: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

pub struct ImageStorage {
    store: Arc<dyn ObjectStore>,
    users_prefix: String,
}

impl ImageStorage {
    pub fn new(store: Arc<dyn ObjectStore>, users_prefix: impl Into<String>) -> Self {
        Self {
            store,
            users_prefix: users_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Keep labels to one safe path segment.
    fn sanitize_label(label: &str) -> String {
        let cleaned: String = label
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        let cleaned = cleaned.trim_matches('-');
        if cleaned.is_empty() {
            ANONYMOUS_LABEL.to_string()
        } else {
            cleaned.to_string()
        }
    }

    fn extension_for(file_name: &str) -> String {
        file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
    }

    /// Destination path for a photo uploaded at `now`.
    pub fn destination_for(&self, label: &str, file_name: &str, now: DateTime<Utc>) -> String {
        format!(
            "{}/{}/avatar-{}.{}",
            self.users_prefix,
            Self::sanitize_label(label),
            now.timestamp_millis(),
            Self::extension_for(file_name)
        )
    }

    /// Store a photo and return its destination path.
    pub async fn try_upload(
        &self,
        image_data: Vec<u8>,
        file_name: &str,
        label: &str,
    ) -> Result<String, RegistrationError> {
        if image_data.is_empty() {
            return Err(RegistrationError::ValidationError(
                "Uploaded file is missing or empty".to_string(),
            ));
        }
        image::guess_format(&image_data).map_err(|e| {
            RegistrationError::ValidationError(format!("Uploaded file is not an image: {}", e))
        })?;

        let destination = self.destination_for(label, file_name, Utc::now());
        debug!("Uploading {} ({} bytes) to {}", file_name, image_data.len(), destination);

        self.store
            .put(&destination, image_data, &ObjectMetadata::photo())
            .await
            .map_err(|e| RegistrationError::UploadFailure(e.to_string()))?;

        info!("Uploaded photo for '{}': {}", label, destination);
        Ok(destination)
    }

    /// Single upload attempt; every failure is folded into `success: false`.
    pub async fn upload(&self, image_data: Vec<u8>, file_name: &str, label: &str) -> UploadResult {
        match self.try_upload(image_data, file_name, label).await {
            Ok(destination) => UploadResult::stored(destination),
            Err(e) => {
                error!("Error while uploading {} to cloud storage: {}", file_name, e);
                UploadResult::failed()
            }
        }
    }

    /// One-hour read URL for a stored photo.
    pub async fn signed_url(&self, destination: &str) -> Result<SignedUrl, RegistrationError> {
        let issued_at = Utc::now();
        let url = self.store.signed_url(destination, SIGNED_URL_TTL).await?;
        let ttl = chrono::Duration::from_std(SIGNED_URL_TTL)
            .map_err(|e| RegistrationError::ConfigError(e.to_string()))?;

        debug!("Signed URL for {} issued", destination);
        Ok(SignedUrl {
            url,
            expires_at: issued_at + ttl,
        })
    }

    pub fn public_url(&self, destination: &str) -> String {
        self.store.public_url(destination)
    }

    /// Fails with "Photo required" unless `destination` names a stored photo
    /// under the users prefix.
    pub async fn ensure_uploaded(&self, destination: &str) -> Result<(), RegistrationError> {
        let in_users = destination
            .strip_prefix(&self.users_prefix)
            .map_or(false, |rest| rest.starts_with('/') && !rest.contains(".."));
        if in_users && self.store.get(destination).await?.is_some() {
            return Ok(());
        }

        warn!("Rejecting photo reference {}: no uploaded photo there", destination);
        Err(RegistrationError::ValidationError(format!(
            "Photo required: no uploaded photo found at {}",
            destination
        )))
    }

    pub async fn download(&self, destination: &str) -> Result<Vec<u8>, RegistrationError> {
        self.store
            .get(destination)
            .await?
            .ok_or_else(|| RegistrationError::NotFound(destination.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registration::object_store::MemoryObjectStore;
    use chrono::TimeZone;

    /// Smallest byte sequence `image::guess_format` accepts as a JPEG.
    pub(crate) fn jpeg_bytes() -> Vec<u8> {
        vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00]
    }

    fn storage() -> (Arc<MemoryObjectStore>, ImageStorage) {
        let store = Arc::new(MemoryObjectStore::new("test-bucket"));
        let images = ImageStorage::new(store.clone(), "users/");
        (store, images)
    }

    #[test]
    fn destination_follows_the_namespacing_scheme() {
        let (_, images) = storage();
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

        assert_eq!(
            images.destination_for("Search-user", "user-1.jpg", now),
            "users/Search-user/avatar-1700000000123.jpg"
        );
        assert_eq!(
            images.destination_for("../Asha Verma", "photo.PNG", now),
            "users/Asha-Verma/avatar-1700000000123.png"
        );
        assert_eq!(
            images.destination_for("", "blob", now),
            "users/anonymous/avatar-1700000000123.jpg"
        );
        assert_eq!(
            images.destination_for("x", "clip.gif", now),
            "users/x/avatar-1700000000123.jpg"
        );
    }

    #[tokio::test]
    async fn upload_stores_jpeg_with_no_cache() {
        let (store, images) = storage();
        let result = images.upload(jpeg_bytes(), "user-1.jpg", "Search-user").await;

        assert!(result.success);
        let destination = result.destination.unwrap();
        assert!(destination.starts_with("users/Search-user/avatar-"));

        let stored = store.object(&destination).await.unwrap();
        assert_eq!(stored.metadata.content_type, "image/jpeg");
        assert_eq!(stored.metadata.cache_control.as_deref(), Some("no-cache"));
    }

    #[tokio::test]
    async fn transport_failure_yields_unsuccessful_result() {
        let (store, images) = storage();
        store.set_failing(true);

        let result = images.upload(jpeg_bytes(), "user-1.jpg", "someone").await;
        assert_eq!(result, UploadResult { success: false, destination: None });
    }

    #[tokio::test]
    async fn non_image_payload_never_reaches_storage() {
        let (store, images) = storage();

        assert!(!images.upload(Vec::new(), "a.jpg", "x").await.success);
        assert!(!images.upload(b"plain text".to_vec(), "a.jpg", "x").await.success);
        assert_eq!(store.operations(), 0);
    }

    #[tokio::test]
    async fn only_stored_photos_under_the_prefix_count_as_uploaded() {
        let (store, images) = storage();
        let destination = images.try_upload(jpeg_bytes(), "a.jpg", "x").await.unwrap();
        assert!(images.ensure_uploaded(&destination).await.is_ok());

        store
            .put("registrations/records/a.json", b"{}".to_vec(), &ObjectMetadata::json())
            .await
            .unwrap();
        for reference in ["users/ghost/avatar-0.jpg", "registrations/records/a.json", "users/../registrations/records/a.json"] {
            let err = images.ensure_uploaded(reference).await.unwrap_err();
            assert!(
                matches!(&err, RegistrationError::ValidationError(msg) if msg.starts_with("Photo required")),
                "{} was accepted",
                reference
            );
        }
    }

    #[tokio::test]
    async fn signed_url_expires_exactly_one_hour_after_issue() {
        let (_, images) = storage();
        let destination = images.try_upload(jpeg_bytes(), "a.jpg", "x").await.unwrap();

        let before = Utc::now();
        let signed = images.signed_url(&destination).await.unwrap();
        let after = Utc::now();

        assert!(signed.url.contains(&destination));
        assert!(signed.url.contains("expires=3600"));
        assert!(signed.expires_at >= before + chrono::Duration::hours(1));
        assert!(signed.expires_at <= after + chrono::Duration::hours(1));
    }
}
