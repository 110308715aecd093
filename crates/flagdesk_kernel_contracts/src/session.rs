#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{Category, ChallengeName, ChallengeRecord, DifficultyLevel};
use crate::{ContractViolation, TimestampMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Submission,
    EntryCreation,
}

impl FlowKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submission => "SUBMISSION",
            Self::EntryCreation => "ENTRY_CREATION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionFlowState {
    SelectChallenge { offered: Vec<ChallengeName> },
    AwaitToken { challenge: ChallengeName },
}

/// Entry-creation flow. Each step carries exactly the fields collected so far, so a field
/// that is not populated yet cannot be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryCreationStep {
    Category,
    Name {
        category: Category,
    },
    Points {
        category: Category,
        name: ChallengeName,
    },
    Link {
        category: Category,
        name: ChallengeName,
        points: u32,
    },
    Level {
        category: Category,
        name: ChallengeName,
        points: u32,
        link: String,
    },
    Token {
        category: Category,
        name: ChallengeName,
        points: u32,
        link: String,
        level: DifficultyLevel,
    },
}

impl EntryCreationStep {
    /// One-based position in the six-step flow.
    pub fn position(&self) -> u8 {
        match self {
            Self::Category => 1,
            Self::Name { .. } => 2,
            Self::Points { .. } => 3,
            Self::Link { .. } => 4,
            Self::Level { .. } => 5,
            Self::Token { .. } => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeDraft {
    pub category: Category,
    pub name: ChallengeName,
    pub points: u32,
    pub reference_link: String,
    pub level: DifficultyLevel,
    pub secret_token: String,
}

impl ChallengeDraft {
    pub fn into_record(self) -> Result<ChallengeRecord, ContractViolation> {
        ChallengeRecord::v1(
            self.name,
            self.category,
            self.level,
            self.points,
            self.secret_token,
            self.reference_link,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActiveFlow {
    #[default]
    Idle,
    Submission(SubmissionFlowState),
    EntryCreation(EntryCreationStep),
}

impl ActiveFlow {
    pub fn kind(&self) -> Option<FlowKind> {
        match self {
            Self::Idle => None,
            Self::Submission(_) => Some(FlowKind::Submission),
            Self::EntryCreation(_) => Some(FlowKind::EntryCreation),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Leaderboard,
    RegisteredUsers,
    SubmissionAudit,
    Solvers,
}

impl ListKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Leaderboard => "leaderboard",
            Self::RegisteredUsers => "registered_users",
            Self::SubmissionAudit => "submission_audit",
            Self::Solvers => "solvers",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Point-in-time rendering of a full listing. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSnapshot {
    pub snapshot_id: SnapshotId,
    pub kind: ListKind,
    pub title: String,
    pub items: Arc<[String]>,
    pub captured_at: TimestampMs,
}

impl ListSnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Ephemeral per-identity state. Lost on restart.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserSession {
    pub flow: ActiveFlow,
    pub snapshots: BTreeMap<ListKind, ListSnapshot>,
}

impl UserSession {
    pub fn snapshot(&self, kind: ListKind) -> Option<&ListSnapshot> {
        self.snapshots.get(&kind)
    }

    /// Replaces any earlier snapshot of the same kind.
    pub fn put_snapshot(&mut self, snapshot: ListSnapshot) {
        self.snapshots.insert(snapshot.kind, snapshot);
    }

    pub fn reset_flow(&mut self) {
        self.flow = ActiveFlow::Idle;
    }
}
