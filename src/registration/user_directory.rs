//! Registration directory stored as JSON documents in the object store
//! Structure:
//!   registrations/records/{id}.json
//!   registrations/index/mobile/{mobile}          -> id
//!   registrations/index/national-id/{nationalId} -> id

use crate::registration::error::RegistrationError;
use crate::registration::object_store::{ObjectMetadata, ObjectStore};
use crate::registration::user_info::{Registration, RegistrationForm};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct UserDirectory {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    /// Serializes uniqueness checks with the writes that follow them.
    write_lock: Mutex<()>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        info!("UserDirectory initialized at {}/{}", store.bucket(), prefix);

        Self {
            store,
            prefix,
            write_lock: Mutex::new(()),
        }
    }

    fn records_folder(&self) -> String {
        format!("{}/records/", self.prefix)
    }

    fn record_path(&self, id: &str) -> String {
        format!("{}{}.json", self.records_folder(), id)
    }

    fn mobile_index_path(&self, mobile: &str) -> String {
        format!("{}/index/mobile/{}", self.prefix, mobile)
    }

    fn national_id_index_path(&self, national_id: &str) -> String {
        format!("{}/index/national-id/{}", self.prefix, national_id)
    }

    async fn indexed_id(&self, index_path: &str) -> Result<Option<String>, RegistrationError> {
        Ok(self
            .store
            .get(index_path)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string()))
    }

    async fn write_record(&self, record: &Registration) -> Result<(), RegistrationError> {
        let json_content = serde_json::to_vec_pretty(record)?;
        self.store
            .put(&self.record_path(&record.id), json_content, &ObjectMetadata::json())
            .await
    }

    /// Validate and persist a submitted form. Mobile and national ID are unique.
    pub async fn register(&self, form: &RegistrationForm) -> Result<Registration, RegistrationError> {
        let record = form.validate()?;

        let _guard = self.write_lock.lock().await;

        let mobile_index = self.mobile_index_path(&record.mobile);
        if self.indexed_id(&mobile_index).await?.is_some() {
            return Err(RegistrationError::AlreadyExists(format!(
                "mobile number {} is already registered",
                record.mobile
            )));
        }

        let national_id_index = self.national_id_index_path(&record.national_id);
        if self.indexed_id(&national_id_index).await?.is_some() {
            return Err(RegistrationError::AlreadyExists(format!(
                "national ID {} is already registered",
                record.formatted_national_id()
            )));
        }

        self.write_record(&record).await?;

        let id_bytes = record.id.as_bytes().to_vec();
        self.store
            .put(&mobile_index, id_bytes.clone(), &ObjectMetadata::json())
            .await?;
        self.store
            .put(&national_id_index, id_bytes, &ObjectMetadata::json())
            .await?;

        info!("Registered '{}' as {}", record.name, record.id);
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<Registration, RegistrationError> {
        let content = self
            .store
            .get(&self.record_path(id))
            .await?
            .ok_or_else(|| RegistrationError::NotFound(format!("registration {}", id)))?;

        Ok(serde_json::from_slice(&content)?)
    }

    async fn find_by_index(&self, index_path: &str) -> Result<Option<Registration>, RegistrationError> {
        match self.indexed_id(index_path).await? {
            Some(id) => match self.get(&id).await {
                Ok(record) => Ok(Some(record)),
                Err(RegistrationError::NotFound(_)) => {
                    warn!("Index {} points at missing record {}", index_path, id);
                    Ok(None)
                }
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }

    pub async fn find_by_mobile(&self, mobile: &str) -> Result<Option<Registration>, RegistrationError> {
        self.find_by_index(&self.mobile_index_path(mobile)).await
    }

    pub async fn find_by_national_id(
        &self,
        national_id: &str,
    ) -> Result<Option<Registration>, RegistrationError> {
        self.find_by_index(&self.national_id_index_path(national_id)).await
    }

    /// All registrations, newest first.
    pub async fn list(&self) -> Result<Vec<Registration>, RegistrationError> {
        let names = self.store.list(&self.records_folder()).await?;

        let mut records = Vec::with_capacity(names.len());
        for name in names.iter().filter(|n| n.ends_with(".json")) {
            match self.store.get(name).await {
                Ok(Some(content)) => match serde_json::from_slice::<Registration>(&content) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Failed to parse registration {}: {}", name, e),
                },
                Ok(None) => {}
                Err(e) => warn!("Failed to read registration {}: {}", name, e),
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Store the face embedding computed by the embedding job. This is the only
    /// field that changes after creation.
    pub async fn set_embedding(
        &self,
        id: &str,
        embedding: Vec<f32>,
    ) -> Result<Registration, RegistrationError> {
        if embedding.is_empty() {
            return Err(RegistrationError::ValidationError(
                "Embedding must not be empty".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;
        let mut record = self.get(id).await?;
        record.embedding = Some(embedding);
        record.updated_at = Utc::now();
        self.write_record(&record).await?;

        info!("Stored embedding for {}", id);
        Ok(record)
    }

    pub async fn delete(&self, id: &str) -> Result<(), RegistrationError> {
        let _guard = self.write_lock.lock().await;
        let record = self.get(id).await?;

        self.store.delete(&self.mobile_index_path(&record.mobile)).await?;
        self.store
            .delete(&self.national_id_index_path(&record.national_id))
            .await?;
        self.store.delete(&self.record_path(id)).await?;

        info!("Deleted registration: {}", id);
        Ok(())
    }
}
