//! Core type definitions with validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix used by the string form of [`UserKey::External`].
const EXTERNAL_PREFIX: &str = "external:";

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The value is not a valid user key.
    #[error("invalid user key: {value}")]
    InvalidUserKey { value: String },
}

/// Identity of a tracked user.
///
/// Users found on the platform carry their platform id. Users that only exist
/// by name get a synthetic id derived from that name, so the same name always
/// maps to the same record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UserKey {
    /// A user known to the platform.
    Known(u64),
    /// A user addressed by name only.
    External(u32),
}

impl UserKey {
    /// Derives the synthetic key for a user addressed by name.
    ///
    /// The name is lower-cased and hashed with MD5; the first 32 bits of the
    /// digest become the id.
    pub fn external_from_name(name: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::Empty { field: "user name" });
        }
        let digest = md5::compute(name.to_lowercase().as_bytes());
        let id = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        Ok(Self::External(id))
    }

    #[must_use]
    pub const fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(id) => write!(f, "{id}"),
            Self::External(id) => write!(f, "{EXTERNAL_PREFIX}{id:08x}"),
        }
    }
}

impl FromStr for UserKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "user key" });
        }
        let invalid = || ValidationError::InvalidUserKey {
            value: s.to_string(),
        };
        if let Some(hex) = s.strip_prefix(EXTERNAL_PREFIX) {
            if hex.len() != 8 {
                return Err(invalid());
            }
            return u32::from_str_radix(hex, 16)
                .map(Self::External)
                .map_err(|_| invalid());
        }
        s.parse::<u64>().map(Self::Known).map_err(|_| invalid())
    }
}

impl TryFrom<String> for UserKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UserKey> for String {
    fn from(key: UserKey) -> Self {
        key.to_string()
    }
}
