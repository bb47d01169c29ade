//! Form field state shared by the registration and face match flows

use crate::registration::{MatchedUser, RegistrationError, RegistrationForm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldName {
    Name,
    Mobile,
    Gender,
    NationalId,
}

impl FieldName {
    pub const ALL: [FieldName; 4] = [
        FieldName::Name,
        FieldName::Mobile,
        FieldName::Gender,
        FieldName::NationalId,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Field {
    pub value: String,
    /// Locked fields were filled from a match and reject edits.
    pub locked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    name: Field,
    mobile: Field,
    gender: Field,
    national_id: Field,
}

impl FormFields {
    pub fn field(&self, name: FieldName) -> &Field {
        match name {
            FieldName::Name => &self.name,
            FieldName::Mobile => &self.mobile,
            FieldName::Gender => &self.gender,
            FieldName::NationalId => &self.national_id,
        }
    }

    fn field_mut(&mut self, name: FieldName) -> &mut Field {
        match name {
            FieldName::Name => &mut self.name,
            FieldName::Mobile => &mut self.mobile,
            FieldName::Gender => &mut self.gender,
            FieldName::NationalId => &mut self.national_id,
        }
    }

    pub fn value(&self, name: FieldName) -> &str {
        &self.field(name).value
    }

    pub fn set(&mut self, name: FieldName, value: impl Into<String>) -> Result<(), RegistrationError> {
        let field = self.field_mut(name);
        if field.locked {
            return Err(RegistrationError::ValidationError(format!(
                "{:?} is filled from a matched registration and cannot be edited",
                name
            )));
        }
        field.value = value.into();
        Ok(())
    }

    /// Fill every field from a matched user and lock it.
    pub fn prefill_locked(&mut self, user: &MatchedUser) {
        self.name = locked(&user.name);
        self.mobile = locked(&user.mobile);
        self.gender = locked(&user.gender.to_string());
        self.national_id = locked(&user.national_id);
    }

    pub fn is_locked(&self) -> bool {
        FieldName::ALL.iter().all(|f| self.field(*f).locked)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn to_form(&self, photo_reference: Option<String>) -> RegistrationForm {
        let opt = |name: FieldName| Some(self.value(name).to_string());
        RegistrationForm {
            name: opt(FieldName::Name),
            mobile: opt(FieldName::Mobile),
            gender: opt(FieldName::Gender),
            national_id: opt(FieldName::NationalId),
            photo_reference,
        }
    }
}

fn locked(value: &str) -> Field {
    Field {
        value: value.to_string(),
        locked: true,
    }
}

/// User-visible outcome of a flow step that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Warning(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Success(m) | Notice::Warning(m) => m,
        }
    }
}
