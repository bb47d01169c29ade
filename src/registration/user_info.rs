//! Registration record and the submitted form it is built from

use crate::registration::error::RegistrationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MOBILE_DIGITS: usize = 10;
pub const NATIONAL_ID_DIGITS: usize = 12;
pub const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(format!("Gender must be male, female or other (got '{}')", other)),
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
            Gender::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: String,
    pub name: String,
    pub mobile: String,
    pub gender: Gender,
    pub national_id: String,
    /// Destination path of the uploaded photo
    pub photo_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn filename(&self) -> String {
        format!("{}.json", self.id)
    }

    /// National ID grouped as `1234 5678 9012` for display.
    pub fn formatted_national_id(&self) -> String {
        format_national_id(&self.national_id)
    }
}

pub fn format_national_id(national_id: &str) -> String {
    if !is_valid_national_id(national_id) {
        return national_id.to_string();
    }
    format!(
        "{} {} {}",
        &national_id[0..4],
        &national_id[4..8],
        &national_id[8..12]
    )
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_valid_mobile(mobile: &str) -> bool {
    is_digits(mobile, MOBILE_DIGITS)
}

pub fn is_valid_national_id(national_id: &str) -> bool {
    is_digits(national_id, NATIONAL_ID_DIGITS)
}

/// Fields as submitted by the registration form. Everything is optional here;
/// [`RegistrationForm::validate`] decides what is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default, alias = "aadharNumber")]
    pub national_id: Option<String>,
    #[serde(default, alias = "image", alias = "photoUrl")]
    pub photo_reference: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl RegistrationForm {
    /// Check presence and format of every field and build the record to store.
    pub fn validate(&self) -> Result<Registration, RegistrationError> {
        let name = present(&self.name)
            .ok_or_else(|| RegistrationError::ValidationError("Name is required".to_string()))?;
        let mobile = present(&self.mobile).ok_or_else(|| {
            RegistrationError::ValidationError("Mobile number is required".to_string())
        })?;
        let gender = present(&self.gender)
            .ok_or_else(|| RegistrationError::ValidationError("Gender is required".to_string()))?;
        let national_id = present(&self.national_id).ok_or_else(|| {
            RegistrationError::ValidationError("National ID number is required".to_string())
        })?;
        let photo_reference = present(&self.photo_reference).ok_or_else(|| {
            RegistrationError::ValidationError(
                "Photo required: capture and upload a photo before submitting".to_string(),
            )
        })?;

        if name.chars().count() > MAX_NAME_LEN {
            return Err(RegistrationError::ValidationError(format!(
                "Name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }
        if !is_valid_mobile(mobile) {
            return Err(RegistrationError::ValidationError(format!(
                "Mobile number must be exactly {} digits",
                MOBILE_DIGITS
            )));
        }
        if !is_valid_national_id(national_id) {
            return Err(RegistrationError::ValidationError(format!(
                "National ID number must be exactly {} digits",
                NATIONAL_ID_DIGITS
            )));
        }
        let gender: Gender = gender.parse().map_err(RegistrationError::ValidationError)?;

        let now = Utc::now();
        Ok(Registration {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            mobile: mobile.to_string(),
            gender,
            national_id: national_id.to_string(),
            photo_reference: photo_reference.to_string(),
            embedding: None,
            created_at: now,
            updated_at: now,
        })
    }
}
