//! Face match orchestration: signed URL, then matcher, then a typed outcome

use crate::registration::error::RegistrationError;
use crate::registration::image_storage::{ImageStorage, SignedUrl};
use crate::registration::matcher::{FaceMatcher, MatchedUser};
use std::sync::Arc;
use tracing::{info, warn};

const NO_MATCH_MESSAGE: &str = "No matching user found";

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched {
        user: MatchedUser,
        /// Read URL for the uploaded probe photo
        preview: SignedUrl,
    },
    NotMatched {
        message: String,
    },
}

impl MatchOutcome {
    pub fn message(&self) -> &str {
        match self {
            MatchOutcome::Matched { .. } => "User matched successfully",
            MatchOutcome::NotMatched { message } => message,
        }
    }
}

pub struct MatchOrchestrator {
    images: Arc<ImageStorage>,
    matcher: Arc<dyn FaceMatcher>,
}

impl MatchOrchestrator {
    pub fn new(images: Arc<ImageStorage>, matcher: Arc<dyn FaceMatcher>) -> Self {
        Self { images, matcher }
    }

    /// Match the photo stored at `destination` against registered users.
    pub async fn find_match(&self, destination: &str) -> Result<MatchOutcome, RegistrationError> {
        let preview = self.images.signed_url(destination).await?;
        let reply = self.matcher.find_match(destination).await?;

        match reply.matched_user {
            Some(user) => {
                info!("Matched {} to '{}'", destination, user.name);
                Ok(MatchOutcome::Matched { user, preview })
            }
            None => {
                let message = reply
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| NO_MATCH_MESSAGE.to_string());
                warn!("No match for {}: {}", destination, message);
                Ok(MatchOutcome::NotMatched { message })
            }
        }
    }

    /// Like [`find_match`](Self::find_match) but a miss is an error.
    pub async fn require_match(&self, destination: &str) -> Result<MatchedUser, RegistrationError> {
        match self.find_match(destination).await? {
            MatchOutcome::Matched { user, .. } => Ok(user),
            MatchOutcome::NotMatched { message } => Err(RegistrationError::MatchNotFound(message)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registration::image_storage::tests::jpeg_bytes;
    use crate::registration::matcher::MatchReply;
    use crate::registration::object_store::MemoryObjectStore;
    use crate::registration::user_info::Gender;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted matcher recording the paths it was asked about.
    pub(crate) struct FakeMatcher {
        pub reply: Mutex<Option<Result<MatchReply, RegistrationError>>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeMatcher {
        pub(crate) fn answering(reply: Result<MatchReply, RegistrationError>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl FaceMatcher for FakeMatcher {
        async fn find_match(&self, photo_path: &str) -> Result<MatchReply, RegistrationError> {
            self.calls.lock().unwrap().push(photo_path.to_string());
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(MatchReply::default()))
        }
    }

    pub(crate) fn candidate() -> MatchedUser {
        MatchedUser {
            id: Some("reg-1".to_string()),
            name: "Asha Verma".to_string(),
            mobile: "9876543210".to_string(),
            gender: Gender::Female,
            national_id: "123456789012".to_string(),
            photo_reference: None,
        }
    }

    async fn uploaded() -> (Arc<ImageStorage>, String) {
        let store = Arc::new(MemoryObjectStore::new("test-bucket"));
        let images = Arc::new(ImageStorage::new(store, "users"));
        let destination = images
            .try_upload(jpeg_bytes(), "user-1.jpg", "Search-user")
            .await
            .unwrap();
        (images, destination)
    }

    #[tokio::test]
    async fn candidate_becomes_matched_outcome() {
        let (images, destination) = uploaded().await;
        let matcher = FakeMatcher::answering(Ok(MatchReply {
            matched_user: Some(candidate()),
            message: None,
        }));
        let orchestrator = MatchOrchestrator::new(images, matcher.clone());

        match orchestrator.find_match(&destination).await.unwrap() {
            MatchOutcome::Matched { user, preview } => {
                assert_eq!(user, candidate());
                assert!(preview.url.contains(&destination));
            }
            other => panic!("expected a match, got {:?}", other),
        }
        assert_eq!(*matcher.calls.lock().unwrap(), vec![destination]);
    }

    #[tokio::test]
    async fn empty_reply_is_not_matched_with_a_message() {
        let (images, destination) = uploaded().await;
        let orchestrator =
            MatchOrchestrator::new(images, FakeMatcher::answering(Ok(MatchReply::default())));

        let outcome = orchestrator.find_match(&destination).await.unwrap();
        assert_eq!(
            outcome,
            MatchOutcome::NotMatched { message: NO_MATCH_MESSAGE.to_string() }
        );
        assert!(matches!(
            orchestrator.require_match(&destination).await,
            Err(RegistrationError::MatchNotFound(_))
        ));
    }

    #[tokio::test]
    async fn transport_failure_is_propagated() {
        let (images, destination) = uploaded().await;
        let orchestrator = MatchOrchestrator::new(
            images,
            FakeMatcher::answering(Err(RegistrationError::TransportFailure(
                "Error in finding match".to_string(),
            ))),
        );

        assert!(matches!(
            orchestrator.find_match(&destination).await,
            Err(RegistrationError::TransportFailure(_))
        ));
    }

    #[tokio::test]
    async fn missing_upload_stops_before_the_matcher() {
        let (images, _) = uploaded().await;
        let matcher = FakeMatcher::answering(Ok(MatchReply::default()));
        let orchestrator = MatchOrchestrator::new(images, matcher.clone());

        assert!(matches!(
            orchestrator.find_match("users/nobody/avatar-0.jpg").await,
            Err(RegistrationError::NotFound(_))
        ));
        assert_eq!(matcher.call_count(), 0);
    }
}
