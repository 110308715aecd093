#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::validate_text;
use crate::identity::DisplayName;
use crate::{ContractViolation, SchemaVersion, TimestampMs, Validate};

pub const CATALOG_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const CHALLENGE_NAME_MAX_LEN: usize = 128;
pub const SECRET_TOKEN_MAX_LEN: usize = 256;
pub const REFERENCE_LINK_MAX_LEN: usize = 512;
pub const CHALLENGE_POINTS_MAX: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Crypto,
    Web,
    Forensics,
    Pwn,
    Reverse,
}

impl Category {
    pub const fn all() -> &'static [Self] {
        &[
            Self::Crypto,
            Self::Web,
            Self::Forensics,
            Self::Pwn,
            Self::Reverse,
        ]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crypto => "Crypto",
            Self::Web => "Web",
            Self::Forensics => "Forensics",
            Self::Pwn => "Pwn",
            Self::Reverse => "Reverse",
        }
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

impl DifficultyLevel {
    pub const fn all() -> &'static [Self] {
        &[Self::Easy, Self::Medium, Self::Hard]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
        }
    }

}

/// Globally unique challenge key. Matched verbatim after trimming surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChallengeName(String);

impl ChallengeName {
    pub fn new(name: impl Into<String>) -> Result<Self, ContractViolation> {
        let name = name.into();
        let trimmed = name.trim();
        validate_text("challenge_name", trimmed, CHALLENGE_NAME_MAX_LEN)?;
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChallengeName {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChallengeName> for String {
    fn from(value: ChallengeName) -> Self {
        value.0
    }
}

impl std::fmt::Display for ChallengeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    pub schema_version: SchemaVersion,
    pub name: ChallengeName,
    pub category: Category,
    pub level: DifficultyLevel,
    pub points: u32,
    pub secret_token: String,
    pub reference_link: String,
}

impl ChallengeRecord {
    pub fn v1(
        name: ChallengeName,
        category: Category,
        level: DifficultyLevel,
        points: u32,
        secret_token: String,
        reference_link: String,
    ) -> Result<Self, ContractViolation> {
        let rec = Self {
            schema_version: CATALOG_CONTRACT_VERSION,
            name,
            category,
            level,
            points,
            secret_token,
            reference_link,
        };
        rec.validate()?;
        Ok(rec)
    }

    /// Exact, case-sensitive comparison after trimming surrounding whitespace of the attempt.
    pub fn token_matches(&self, submitted: &str) -> bool {
        submitted.trim() == self.secret_token
    }
}

impl Validate for ChallengeRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != CATALOG_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "challenge_record.schema_version",
                reason: "must match CATALOG_CONTRACT_VERSION",
            });
        }
        if self.points > CHALLENGE_POINTS_MAX {
            return Err(ContractViolation::InvalidRange {
                field: "challenge_record.points",
                min: 0,
                max: i64::from(CHALLENGE_POINTS_MAX),
                got: i64::from(self.points),
            });
        }
        validate_text(
            "challenge_record.secret_token",
            &self.secret_token,
            SECRET_TOKEN_MAX_LEN,
        )?;
        if self.secret_token.trim() != self.secret_token {
            return Err(ContractViolation::InvalidValue {
                field: "challenge_record.secret_token",
                reason: "must not carry surrounding whitespace",
            });
        }
        validate_text(
            "challenge_record.reference_link",
            &self.reference_link,
            REFERENCE_LINK_MAX_LEN,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRecord {
    pub username: DisplayName,
    pub granted_at: TimestampMs,
}
