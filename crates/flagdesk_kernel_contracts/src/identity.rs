#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::validate_text;
use crate::ContractViolation;

pub const DISPLAY_NAME_MAX_LEN: usize = 64;

/// Stable numeric identity assigned by the messaging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Result<Self, ContractViolation> {
        if id <= 0 {
            return Err(ContractViolation::InvalidValue {
                field: "user_id",
                reason: "must be > 0",
            });
        }
        Ok(Self(id))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for UserId {
    type Error = ContractViolation;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for i64 {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutable, non-unique handle a user is known by. Also the key of admin grants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayName(String);

impl DisplayName {
    pub fn new(name: impl Into<String>) -> Result<Self, ContractViolation> {
        let name = name.into();
        validate_text("display_name", &name, DISPLAY_NAME_MAX_LEN)?;
        if name.chars().any(char::is_whitespace) {
            return Err(ContractViolation::InvalidValue {
                field: "display_name",
                reason: "must not contain whitespace",
            });
        }
        Ok(Self(name))
    }

    /// Accepts the `@handle` form operators type when granting privileges.
    pub fn parse_handle(raw: &str) -> Result<Self, ContractViolation> {
        let trimmed = raw.trim();
        Self::new(trimmed.strip_prefix('@').unwrap_or(trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DisplayName {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DisplayName> for String {
    fn from(value: DisplayName) -> Self {
        value.0
    }
}

impl std::fmt::Display for DisplayName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
