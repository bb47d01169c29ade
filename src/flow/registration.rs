//! Registration form session: capture, upload on capture, then submit

use crate::capture::{CameraDevice, CaptureController, CaptureError, CaptureState};
use crate::flow::form::{FieldName, FormFields, Notice};
use crate::registration::{ImageStorage, RegistrationError, SubmissionService, SubmitReceipt};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_LABEL: &str = "registrant";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    NotStarted,
    Pending,
    Uploaded(String),
    Failed,
}

pub struct RegistrationFlow {
    capture: CaptureController,
    images: Arc<ImageStorage>,
    submission: Arc<SubmissionService>,
    fields: FormFields,
    upload: UploadStatus,
}

impl RegistrationFlow {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        images: Arc<ImageStorage>,
        submission: Arc<SubmissionService>,
    ) -> Self {
        Self {
            capture: CaptureController::new(camera),
            images,
            submission,
            fields: FormFields::default(),
            upload: UploadStatus::NotStarted,
        }
    }

    pub fn fields(&self) -> &FormFields {
        &self.fields
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    pub fn upload_status(&self) -> &UploadStatus {
        &self.upload
    }

    pub fn set_field(&mut self, name: FieldName, value: impl Into<String>) -> Result<(), RegistrationError> {
        self.fields.set(name, value)
    }

    pub async fn start_camera(&mut self) -> Result<(), CaptureError> {
        self.capture.start().await
    }

    pub fn cancel_camera(&mut self) {
        self.capture.stop();
    }

    fn label(&self) -> String {
        let name = self.fields.value(FieldName::Name).trim();
        if name.is_empty() {
            DEFAULT_LABEL.to_string()
        } else {
            name.to_string()
        }
    }

    /// Capture a frame and upload it right away. A failed upload discards the
    /// photo so the user can retake it.
    pub async fn capture_photo(&mut self) -> Result<String, RegistrationError> {
        let (jpeg, file_name) = {
            let photo = self.capture.capture().await?;
            (photo.jpeg.clone(), photo.file_name.clone())
        };

        self.upload = UploadStatus::Pending;
        let result = self.images.upload(jpeg, &file_name, &self.label()).await;

        match result.destination {
            Some(destination) if result.success => {
                info!("Image uploaded to cloud: {}", destination);
                self.upload = UploadStatus::Uploaded(destination.clone());
                Ok(destination)
            }
            _ => {
                warn!("Failed to upload captured photo {}", file_name);
                self.capture.remove();
                self.upload = UploadStatus::Failed;
                Err(RegistrationError::UploadFailure(
                    "Failed to upload image. Please try again.".to_string(),
                ))
            }
        }
    }

    pub fn remove_photo(&mut self) {
        self.capture.remove();
        self.upload = UploadStatus::NotStarted;
    }

    fn uploaded_photo(&self) -> Option<String> {
        match &self.upload {
            UploadStatus::Uploaded(destination) if self.capture.state() == CaptureState::Captured => {
                Some(destination.clone())
            }
            _ => None,
        }
    }

    /// Validate locally, then persist. Nothing is sent while a field or the
    /// photo is missing; on success the session is reset.
    pub async fn submit(&mut self) -> Result<(SubmitReceipt, Notice), RegistrationError> {
        let form = self.fields.to_form(self.uploaded_photo());
        form.validate()?;

        let receipt = self.submission.submit(&form).await?;
        info!("Registration {} submitted", receipt.id);

        self.capture.remove();
        self.fields.clear();
        self.upload = UploadStatus::NotStarted;

        let notice = Notice::Success("Registration submitted successfully!".to_string());
        Ok((receipt, notice))
    }
}
