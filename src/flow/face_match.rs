//! Face match session: capture locally, upload on submit, look up a match

use crate::capture::{CameraDevice, CaptureController, CaptureError};
use crate::flow::form::{FieldName, FormFields, Notice};
use crate::registration::{
    ImageStorage, MatchOrchestrator, MatchOutcome, MatchedUser, RegistrationError,
};
use std::sync::Arc;
use tracing::info;

/// Upload label for probe photos.
pub const SEARCH_LABEL: &str = "Search-user";

pub struct FaceMatchFlow {
    capture: CaptureController,
    images: Arc<ImageStorage>,
    orchestrator: Arc<MatchOrchestrator>,
    fields: FormFields,
    matched: Option<MatchedUser>,
}

impl FaceMatchFlow {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        images: Arc<ImageStorage>,
        orchestrator: Arc<MatchOrchestrator>,
    ) -> Self {
        Self {
            capture: CaptureController::new(camera),
            images,
            orchestrator,
            fields: FormFields::default(),
            matched: None,
        }
    }

    pub fn fields(&self) -> &FormFields {
        &self.fields
    }

    pub fn matched(&self) -> Option<&MatchedUser> {
        self.matched.as_ref()
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    /// Edits go through the same lock a match applies.
    pub fn set_field(&mut self, name: FieldName, value: impl Into<String>) -> Result<(), RegistrationError> {
        self.fields.set(name, value)
    }

    pub async fn start_camera(&mut self) -> Result<(), CaptureError> {
        self.capture.start().await
    }

    pub fn cancel_camera(&mut self) {
        self.capture.stop();
    }

    pub async fn capture_photo(&mut self) -> Result<(), CaptureError> {
        self.capture.capture().await.map(|_| ())
    }

    pub fn remove_photo(&mut self) {
        self.capture.remove();
    }

    /// Upload the captured photo and ask the matcher about it. A match fills
    /// and locks the form; a miss is a warning, not an error.
    pub async fn submit(&mut self) -> Result<Notice, RegistrationError> {
        let (jpeg, file_name) = match self.capture.photo() {
            Some(photo) => (photo.jpeg.clone(), photo.file_name.clone()),
            None => {
                return Err(RegistrationError::ValidationError(
                    "Photo required: capture a photo before submitting".to_string(),
                ))
            }
        };

        let result = self.images.upload(jpeg, &file_name, SEARCH_LABEL).await;
        let destination = match result.destination {
            Some(destination) if result.success => destination,
            _ => {
                return Err(RegistrationError::UploadFailure(
                    "Failed to upload image to cloud storage".to_string(),
                ))
            }
        };

        match self.orchestrator.find_match(&destination).await? {
            MatchOutcome::Matched { user, .. } => {
                info!("Prefilling form from matched registration '{}'", user.name);
                self.fields.prefill_locked(&user);
                self.matched = Some(user);
                Ok(Notice::Success("User matched successfully".to_string()))
            }
            MatchOutcome::NotMatched { message } => Ok(Notice::Warning(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticCamera;
    use crate::registration::match_orchestrator::tests::{candidate, FakeMatcher};
    use crate::registration::{MatchReply, MemoryObjectStore};

    fn flow(matcher: Arc<FakeMatcher>) -> (Arc<MemoryObjectStore>, FaceMatchFlow) {
        let store = Arc::new(MemoryObjectStore::new("test-bucket"));
        let images = Arc::new(ImageStorage::new(store.clone(), "users"));
        let orchestrator = Arc::new(MatchOrchestrator::new(images.clone(), matcher));
        let camera = Arc::new(SyntheticCamera::new(128, 96));
        (store, FaceMatchFlow::new(camera, images, orchestrator))
    }

    #[tokio::test]
    async fn match_prefills_and_locks_the_form() {
        let matcher = FakeMatcher::answering(Ok(MatchReply {
            matched_user: Some(candidate()),
            message: None,
        }));
        let (_, mut flow) = flow(matcher.clone());

        flow.start_camera().await.unwrap();
        flow.capture_photo().await.unwrap();
        let notice = flow.submit().await.unwrap();

        assert_eq!(notice, Notice::Success("User matched successfully".to_string()));
        let fields = flow.fields();
        assert_eq!(fields.value(FieldName::Name), "Asha Verma");
        assert_eq!(fields.value(FieldName::Mobile), "9876543210");
        assert_eq!(fields.value(FieldName::Gender), "female");
        assert_eq!(fields.value(FieldName::NationalId), "123456789012");
        assert!(fields.is_locked());
        assert!(flow.set_field(FieldName::Name, "Someone Else").is_err());

        let asked = matcher.calls.lock().unwrap().clone();
        assert!(asked[0].starts_with("users/Search-user/avatar-"));
    }

    #[tokio::test]
    async fn no_match_is_a_warning_and_leaves_fields_editable() {
        let matcher = FakeMatcher::answering(Ok(MatchReply {
            matched_user: None,
            message: Some("No face matched".to_string()),
        }));
        let (_, mut flow) = flow(matcher);

        flow.start_camera().await.unwrap();
        flow.capture_photo().await.unwrap();

        assert_eq!(
            flow.submit().await.unwrap(),
            Notice::Warning("No face matched".to_string())
        );
        assert!(flow.matched().is_none());
        assert!(flow.set_field(FieldName::Name, "typed").is_ok());
    }

    #[tokio::test]
    async fn submit_without_photo_makes_no_calls() {
        let matcher = FakeMatcher::answering(Ok(MatchReply::default()));
        let (store, mut flow) = flow(matcher.clone());

        let err = flow.submit().await.unwrap_err();
        assert!(err.to_string().to_lowercase().contains("photo required"));
        assert_eq!(store.operations(), 0);
        assert_eq!(matcher.call_count(), 0);
    }

    #[tokio::test]
    async fn upload_failure_skips_the_matcher() {
        let matcher = FakeMatcher::answering(Ok(MatchReply::default()));
        let (store, mut flow) = flow(matcher.clone());

        flow.start_camera().await.unwrap();
        flow.capture_photo().await.unwrap();
        store.set_failing(true);

        assert!(matches!(
            flow.submit().await,
            Err(RegistrationError::UploadFailure(_))
        ));
        assert_eq!(matcher.call_count(), 0);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_error() {
        let matcher = FakeMatcher::answering(Err(RegistrationError::TransportFailure(
            "Error in finding match".to_string(),
        )));
        let (_, mut flow) = flow(matcher);

        flow.start_camera().await.unwrap();
        flow.capture_photo().await.unwrap();

        assert!(matches!(
            flow.submit().await,
            Err(RegistrationError::TransportFailure(_))
        ));
        assert!(!flow.fields().is_locked());
    }
}
