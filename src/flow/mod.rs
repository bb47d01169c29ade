//! Form sessions driving Capture -> Upload -> (Match) -> Submit

pub mod face_match;
pub mod form;
pub mod registration;

pub use face_match::{FaceMatchFlow, SEARCH_LABEL};
pub use form::{Field, FieldName, FormFields, Notice};
pub use registration::{RegistrationFlow, UploadStatus};
