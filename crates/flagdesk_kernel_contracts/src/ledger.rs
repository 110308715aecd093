#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use crate::catalog::ChallengeName;
use crate::common::validate_free_text;
use crate::identity::{DisplayName, UserId};
use crate::{ContractViolation, SchemaVersion, TimestampMs, Validate};

pub const LEDGER_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const SUBMITTED_TOKEN_MAX_LEN: usize = 4_096;

/// Insertion sequence of a submission; breaks ties between equal timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionInput {
    pub schema_version: SchemaVersion,
    pub user_id: UserId,
    pub challenge: ChallengeName,
    pub submitted_token: String,
    pub correct: bool,
    pub submitted_at: TimestampMs,
}

impl SubmissionInput {
    pub fn v1(
        user_id: UserId,
        challenge: ChallengeName,
        submitted_token: String,
        correct: bool,
        submitted_at: TimestampMs,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            schema_version: LEDGER_CONTRACT_VERSION,
            user_id,
            challenge,
            submitted_token,
            correct,
            submitted_at,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for SubmissionInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != LEDGER_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "submission_input.schema_version",
                reason: "must match LEDGER_CONTRACT_VERSION",
            });
        }
        validate_free_text(
            "submission_input.submitted_token",
            &self.submitted_token,
            SUBMITTED_TOKEN_MAX_LEN,
        )
    }
}

/// Append-only audit row. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub schema_version: SchemaVersion,
    pub submission_id: SubmissionId,
    pub user_id: UserId,
    pub challenge: ChallengeName,
    pub submitted_token: String,
    pub correct: bool,
    pub submitted_at: TimestampMs,
}

impl SubmissionRecord {
    pub fn from_input_v1(
        submission_id: SubmissionId,
        input: SubmissionInput,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        Ok(Self {
            schema_version: LEDGER_CONTRACT_VERSION,
            submission_id,
            user_id: input.user_id,
            challenge: input.challenge,
            submitted_token: input.submitted_token,
            correct: input.correct,
            submitted_at: input.submitted_at,
        })
    }

    /// Ordering key for "earliest" questions: timestamp first, insertion order second.
    pub fn chronological_key(&self) -> (TimestampMs, SubmissionId) {
        (self.submitted_at, self.submission_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub display_name: Option<DisplayName>,
    pub points: i64,
    pub last_scored_at: Option<TimestampMs>,
    pub registered_at: TimestampMs,
}

impl UserRecord {
    pub fn first_contact_v1(
        user_id: UserId,
        display_name: Option<DisplayName>,
        registered_at: TimestampMs,
    ) -> Self {
        Self {
            user_id,
            display_name,
            points: 0,
            last_scored_at: None,
            registered_at,
        }
    }

    pub fn display_name_or_unknown(&self) -> &str {
        self.display_name
            .as_ref()
            .map(DisplayName::as_str)
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CascadeStage {
    ReversingPoints,
    DeletingSubmissions,
    DeletingChallenge,
}

impl CascadeStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReversingPoints => "REVERSING_POINTS",
            Self::DeletingSubmissions => "DELETING_SUBMISSIONS",
            Self::DeletingChallenge => "DELETING_CHALLENGE",
        }
    }
}

/// Marker written before a cascading delete so an interrupted sequence can be resumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeletionRecord {
    pub challenge: ChallengeName,
    pub points: u32,
    /// Solvers whose points have not been reversed yet.
    pub remaining_reversals: BTreeSet<UserId>,
    pub reversed_count: u32,
    pub stage: CascadeStage,
    pub started_at: TimestampMs,
}

impl PendingDeletionRecord {
    pub fn v1(
        challenge: ChallengeName,
        points: u32,
        solvers: BTreeSet<UserId>,
        started_at: TimestampMs,
    ) -> Self {
        Self {
            challenge,
            points,
            remaining_reversals: solvers,
            reversed_count: 0,
            stage: CascadeStage::ReversingPoints,
            started_at,
        }
    }
}
