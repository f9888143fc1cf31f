//! Child case domain model.
//!
//! # Responsibility
//! - Define the canonical record for one at-risk or missing child case.
//! - Enforce field invariants at construction and on every mutation.
//!
//! # Invariants
//! - `full_name`, `phone` and `email` are never empty.
//! - `age` is never negative.
//! - `status` is never empty; blank input maps to `ChildStatus::ACTIVE`.
//! - `id` is assigned once and has no setter.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Opaque case identifier in string form.
///
/// Generated as a UUID v4 when the caller leaves it blank; caller-supplied
/// values are trusted to be unique.
pub type ChildId = String;

/// Gender as stored on the case.
///
/// Kept as open text: the known values below are what the reporting flow
/// emits, but construction does not reject other values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gender(String);

impl Gender {
    pub const MALE: &'static str = "masculino";
    pub const FEMALE: &'static str = "femenino";
    pub const OTHER: &'static str = "otro";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Gender {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Gender {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Case status text.
///
/// Only emptiness is validated; `find` matches this value exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChildStatus(String);

impl ChildStatus {
    /// Default status for newly reported cases.
    pub const ACTIVE: &'static str = "activo";
    /// Case needs immediate attention.
    pub const URGENT: &'static str = "urgente";
    /// Child was found / case closed.
    pub const RESOLVED: &'static str = "resuelto";

    pub fn active() -> Self {
        Self(Self::ACTIVE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ChildStatus {
    fn default() -> Self {
        Self::active()
    }
}

impl From<&str> for ChildStatus {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ChildStatus {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Validation failure for child construction or mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildValidationError {
    EmptyFullName,
    NegativeAge(i32),
    EmptyPhone,
    EmptyEmail,
    EmptyStatus,
}

impl Display for ChildValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFullName => write!(f, "full_name cannot be empty"),
            Self::NegativeAge(age) => write!(f, "age cannot be negative, got {age}"),
            Self::EmptyPhone => write!(f, "phone cannot be empty"),
            Self::EmptyEmail => write!(f, "email cannot be empty"),
            Self::EmptyStatus => write!(f, "status cannot be empty"),
        }
    }
}

impl Error for ChildValidationError {}

/// Unvalidated constructor input, one field per record attribute.
///
/// Also the wire shape accepted when deserializing a [`Child`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChildInput {
    /// Blank means "assign a fresh id".
    #[serde(default)]
    pub id: String,
    pub full_name: String,
    pub age: i32,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub photos: Vec<String>,
    pub phone: String,
    pub email: String,
    /// Blank means `ChildStatus::ACTIVE`.
    #[serde(default = "blank_status")]
    pub status: ChildStatus,
}

fn blank_status() -> ChildStatus {
    ChildStatus::from("")
}

/// One child case record.
///
/// Fields are private; reads go through accessors and only `status` and
/// `photos` can change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ChildInput")]
pub struct Child {
    id: ChildId,
    full_name: String,
    age: i32,
    birth_date: NaiveDate,
    gender: Gender,
    description: String,
    location: String,
    photos: Vec<String>,
    phone: String,
    email: String,
    status: ChildStatus,
}

impl Child {
    /// Validates `input` and assembles a record.
    ///
    /// # Errors
    /// Reports the first violation in this order: empty `full_name`,
    /// negative `age`, empty `phone`, empty `email`.
    pub fn new(input: ChildInput) -> Result<Self, ChildValidationError> {
        if input.full_name.is_empty() {
            return Err(ChildValidationError::EmptyFullName);
        }
        if input.age < 0 {
            return Err(ChildValidationError::NegativeAge(input.age));
        }
        if input.phone.is_empty() {
            return Err(ChildValidationError::EmptyPhone);
        }
        if input.email.is_empty() {
            return Err(ChildValidationError::EmptyEmail);
        }

        let id = if input.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            input.id
        };
        let status = if input.status.is_empty() {
            ChildStatus::active()
        } else {
            input.status
        };

        Ok(Self {
            id,
            full_name: input.full_name,
            age: input.age,
            birth_date: input.birth_date,
            gender: input.gender,
            description: input.description,
            location: input.location,
            photos: input.photos,
            phone: input.phone,
            email: input.email,
            status,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn age(&self) -> i32 {
        self.age
    }

    pub fn birth_date(&self) -> NaiveDate {
        self.birth_date
    }

    pub fn gender(&self) -> &Gender {
        &self.gender
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn photos(&self) -> &[String] {
        &self.photos
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn status(&self) -> &ChildStatus {
        &self.status
    }

    /// Replaces the case status.
    ///
    /// Leaves the current status untouched when `status` is empty.
    pub fn set_status(
        &mut self,
        status: impl Into<ChildStatus>,
    ) -> Result<(), ChildValidationError> {
        let status = status.into();
        if status.is_empty() {
            return Err(ChildValidationError::EmptyStatus);
        }
        self.status = status;
        Ok(())
    }

    /// Replaces the whole photo list. An empty list clears it.
    pub fn set_photos(&mut self, photos: Vec<String>) {
        self.photos = photos;
    }
}

impl TryFrom<ChildInput> for Child {
    type Error = ChildValidationError;

    fn try_from(value: ChildInput) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
