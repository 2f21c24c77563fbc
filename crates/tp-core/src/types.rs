//! Core type definitions with validation.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Format of an [`EntryKey`]: local civil time, second precision.
pub const KEY_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The value does not follow the `YYYYMMDD-HHMMSS` layout.
    #[error("invalid entry key: {value}")]
    InvalidKey { value: String },
}

/// Canonical identity of an entry and join key into the ledger.
///
/// Always `YYYYMMDD-HHMMSS` in locale time, e.g. `20210501-060003`. The same
/// string is used as the entry's directory name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryKey(String);

impl EntryKey {
    /// Creates a key after validating its layout.
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        if NaiveDateTime::parse_from_str(&key, KEY_FORMAT).is_err() || key.len() != 15 {
            return Err(ValidationError::InvalidKey { value: key });
        }
        Ok(Self(key))
    }

    /// Builds the key for a local date time.
    #[must_use]
    pub fn from_datetime(local: &NaiveDateTime) -> Self {
        Self(local.format(KEY_FORMAT).to_string())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EntryKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A front-matter value.
///
/// There is no null variant: an optional field is either present with a
/// value or absent from [`Fields`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// A TOML date-time kept in its written form, e.g. `2020-12-01T10:00:00+01:00`.
    Datetime(String),
    /// Arrays found in templates or device profiles (e.g. `tags = []`).
    List(Vec<FieldValue>),
    Table(Fields),
}

impl FieldValue {
    /// Returns the string content, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the written form of a string or date-time value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Datetime(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// Ordered attribute map of an entry or device profile.
pub type Fields = BTreeMap<String, FieldValue>;
