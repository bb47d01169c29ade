//! Client for the external AI server: face matching and embedding requests

use crate::registration::config::MatcherConfig;
use crate::registration::error::RegistrationError;
use crate::registration::user_info::Gender;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Candidate returned by the matcher for a photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedUser {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub mobile: String,
    pub gender: Gender,
    #[serde(alias = "aadharNumber")]
    pub national_id: String,
    #[serde(default, alias = "photoUrl", skip_serializing_if = "Option::is_none")]
    pub photo_reference: Option<String>,
}

/// Matcher answer; `matched_user` is `None` when nobody is similar enough.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReply {
    #[serde(default)]
    pub matched_user: Option<MatchedUser>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchRequest<'a> {
    photo_url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    user_id: &'a str,
}

#[async_trait]
pub trait FaceMatcher: Send + Sync {
    /// Look up a registered user by the photo stored at `photo_path`.
    async fn find_match(&self, photo_path: &str) -> Result<MatchReply, RegistrationError>;
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Ask the AI server to compute and store the embedding for `user_id`.
    async fn request_embedding(&self, user_id: &str) -> Result<(), RegistrationError>;
}

pub struct HttpAiClient {
    client: Client,
    base_url: String,
}

impl HttpAiClient {
    pub fn new(config: &MatcherConfig) -> Result<Self, RegistrationError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RegistrationError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl FaceMatcher for HttpAiClient {
    async fn find_match(&self, photo_path: &str) -> Result<MatchReply, RegistrationError> {
        debug!("Finding match for image path {}", photo_path);

        let response = self
            .client
            .post(self.endpoint("match"))
            .json(&MatchRequest { photo_url: photo_path })
            .send()
            .await
            .map_err(|e| {
                error!("Error in finding match: {}", e);
                RegistrationError::TransportFailure("Error in finding match".to_string())
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(MatchReply::default());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Matcher returned {}: {}", status, text);
            return Err(RegistrationError::TransportFailure(
                "Error in finding match".to_string(),
            ));
        }

        let reply: MatchReply = response.json().await.map_err(|e| {
            error!("Unreadable matcher response: {}", e);
            RegistrationError::TransportFailure("Error in finding match".to_string())
        })?;

        info!(
            "Matcher answered for {}: matched={}",
            photo_path,
            reply.matched_user.is_some()
        );
        Ok(reply)
    }
}

#[async_trait]
impl EmbeddingService for HttpAiClient {
    async fn request_embedding(&self, user_id: &str) -> Result<(), RegistrationError> {
        info!("Updating embedding for user id {}", user_id);

        let response = self
            .client
            .post(self.endpoint("embed"))
            .json(&EmbedRequest { user_id })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistrationError::TransportFailure(format!(
                "embedding service returned {}",
                status
            )));
        }
        Ok(())
    }
}
