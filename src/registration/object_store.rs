//! Object storage backends.
//!
//! Everything the registration layer persists, photos as well as registration
//! documents, goes through [`ObjectStore`]. The GCS backend owns its client for
//! the lifetime of the process; there is no ambient "connected" state.

use crate::registration::auth::StorageAuth;
use crate::registration::config::{RegistrationConfig, StorageBackend};
use crate::registration::error::RegistrationError;
use async_trait::async_trait;
use cloud_storage::{Client, ListRequest};
use futures::stream::StreamExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const NO_CACHE: &str = "no-cache";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: String,
    pub cache_control: Option<String>,
}

impl ObjectMetadata {
    /// Metadata every uploaded photo carries.
    pub fn photo() -> Self {
        Self {
            content_type: JPEG_CONTENT_TYPE.to_string(),
            cache_control: Some(NO_CACHE.to_string()),
        }
    }

    pub fn json() -> Self {
        Self {
            content_type: JSON_CONTENT_TYPE.to_string(),
            cache_control: Some(NO_CACHE.to_string()),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn put(
        &self,
        path: &str,
        data: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<(), RegistrationError>;

    /// `Ok(None)` when the object does not exist.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, RegistrationError>;

    /// Full object names under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, RegistrationError>;

    async fn delete(&self, path: &str) -> Result<(), RegistrationError>;

    /// Read-only signed URL valid for `ttl`.
    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, RegistrationError>;

    fn public_url(&self, path: &str) -> String {
        format!("https://storage.googleapis.com/{}/{}", self.bucket(), path)
    }
}

/// Build the backend selected in `config`.
pub fn connect(config: &RegistrationConfig) -> Result<Arc<dyn ObjectStore>, RegistrationError> {
    match config.backend {
        StorageBackend::Gcs => Ok(Arc::new(GcsObjectStore::connect(config)?)),
        StorageBackend::Memory => {
            info!("Using in-memory object store for bucket {}", config.bucket_name);
            Ok(Arc::new(MemoryObjectStore::new(config.bucket_name.clone())))
        }
    }
}

fn is_not_found(err: &cloud_storage::Error) -> bool {
    let err_str = err.to_string();
    err_str.contains("404") || err_str.contains("not found") || err_str.contains("No such object")
}

pub struct GcsObjectStore {
    client: Client,
    bucket_name: String,
}

impl GcsObjectStore {
    pub fn connect(config: &RegistrationConfig) -> Result<Self, RegistrationError> {
        if config.bucket_name.is_empty() {
            return Err(RegistrationError::ConfigError(
                "bucket_name must be set for the gcs backend".to_string(),
            ));
        }

        let client = StorageAuth::create_client(&config.credentials_path)?;
        info!("GcsObjectStore initialized with bucket: {}", config.bucket_name);

        Ok(Self {
            client,
            bucket_name: config.bucket_name.clone(),
        })
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    async fn put(
        &self,
        path: &str,
        data: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<(), RegistrationError> {
        let mut object = self
            .client
            .object()
            .create(&self.bucket_name, data, path, &metadata.content_type)
            .await
            .map_err(|e| RegistrationError::StorageError(format!("Failed to write {}: {}", path, e)))?;

        // `create` takes no cache-control: patch it, and drop the object if that fails.
        if metadata.cache_control.is_some() {
            object.cache_control = metadata.cache_control.clone();
            if let Err(e) = self.client.object().update(&object).await {
                if let Err(cleanup) = self.client.object().delete(&self.bucket_name, path).await {
                    warn!("Failed to remove {} after metadata error: {}", path, cleanup);
                }
                return Err(RegistrationError::StorageError(format!(
                    "Failed to set metadata on {}: {}",
                    path, e
                )));
            }
        }

        debug!("Wrote gs://{}/{}", self.bucket_name, path);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, RegistrationError> {
        match self.client.object().download(&self.bucket_name, path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(RegistrationError::StorageError(format!(
                "Failed to download {}: {}",
                path, e
            ))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, RegistrationError> {
        let request = ListRequest {
            prefix: Some(prefix.to_string()),
            ..Default::default()
        };

        let stream = self
            .client
            .object()
            .list(&self.bucket_name, request)
            .await
            .map_err(|e| RegistrationError::StorageError(format!("Failed to list {}: {}", prefix, e)))?;

        tokio::pin!(stream);

        let mut names = Vec::new();
        while let Some(result) = stream.next().await {
            let page = result.map_err(|e| {
                RegistrationError::StorageError(format!("Error listing {}: {}", prefix, e))
            })?;
            names.extend(page.items.into_iter().map(|obj| obj.name));
        }

        Ok(names)
    }

    async fn delete(&self, path: &str) -> Result<(), RegistrationError> {
        match self.client.object().delete(&self.bucket_name, path).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(RegistrationError::StorageError(format!(
                "Failed to delete {}: {}",
                path, e
            ))),
        }
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, RegistrationError> {
        let object = self
            .client
            .object()
            .read(&self.bucket_name, path)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    RegistrationError::NotFound(path.to_string())
                } else {
                    RegistrationError::StorageError(format!("Failed to read {}: {}", path, e))
                }
            })?;

        object
            .download_url(ttl.as_secs() as u32)
            .map_err(|e| RegistrationError::StorageError(format!("Failed to sign {}: {}", path, e)))
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub metadata: ObjectMetadata,
}

/// Process-local store used for local runs and tests.
///
/// Counts every call so callers can assert that nothing touched storage, and
/// can be switched into a failing mode to simulate transport errors.
pub struct MemoryObjectStore {
    bucket_name: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    operations: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            objects: RwLock::new(BTreeMap::new()),
            operations: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Number of store calls made so far.
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn object(&self, path: &str) -> Option<StoredObject> {
        self.objects.read().await.get(path).cloned()
    }

    fn begin(&self, op: &str, path: &str) -> Result<(), RegistrationError> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RegistrationError::TransportFailure(format!(
                "simulated failure during {} of {}",
                op, path
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    async fn put(
        &self,
        path: &str,
        data: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<(), RegistrationError> {
        self.begin("put", path)?;
        self.objects.write().await.insert(
            path.to_string(),
            StoredObject {
                data,
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, RegistrationError> {
        self.begin("get", path)?;
        Ok(self.objects.read().await.get(path).map(|obj| obj.data.clone()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, RegistrationError> {
        self.begin("list", prefix)?;
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, path: &str) -> Result<(), RegistrationError> {
        self.begin("delete", path)?;
        self.objects.write().await.remove(path);
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, RegistrationError> {
        self.begin("sign", path)?;
        if !self.objects.read().await.contains_key(path) {
            return Err(RegistrationError::NotFound(path.to_string()));
        }
        Ok(format!(
            "memory://{}/{}?expires={}&token={}",
            self.bucket_name,
            path,
            ttl.as_secs(),
            uuid::Uuid::new_v4().simple()
        ))
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://{}/{}", self.bucket_name, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips_objects_and_metadata() {
        let store = MemoryObjectStore::new("test-bucket");
        store
            .put("users/a/avatar-1.jpg", vec![1, 2, 3], &ObjectMetadata::photo())
            .await
            .unwrap();

        let stored = store.object("users/a/avatar-1.jpg").await.unwrap();
        assert_eq!(stored.data, vec![1, 2, 3]);
        assert_eq!(stored.metadata.content_type, "image/jpeg");
        assert_eq!(stored.metadata.cache_control.as_deref(), Some("no-cache"));

        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.list("users/").await.unwrap(), vec!["users/a/avatar-1.jpg"]);
        assert_eq!(store.operations(), 3);
    }

    #[tokio::test]
    async fn signing_a_missing_object_is_not_found() {
        let store = MemoryObjectStore::new("test-bucket");
        let err = store
            .signed_url("users/nobody.jpg", Duration::from_secs(3600))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::NotFound(_)));
    }

    #[tokio::test]
    async fn failing_mode_rejects_every_call() {
        let store = MemoryObjectStore::new("test-bucket");
        store.set_failing(true);
        let err = store
            .put("x", vec![0], &ObjectMetadata::json())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::TransportFailure(_)));
        assert!(store.object("x").await.is_none());
    }
}
