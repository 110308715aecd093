#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use flagdesk_kernel_contracts::catalog::{AdminRecord, Category, ChallengeName, ChallengeRecord};
use flagdesk_kernel_contracts::identity::{DisplayName, UserId};
use flagdesk_kernel_contracts::ledger::{
    CascadeStage, PendingDeletionRecord, SubmissionId, SubmissionInput, SubmissionRecord,
    UserRecord,
};
use flagdesk_kernel_contracts::{ContractViolation, TimestampMs, Validate};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("foreign key violation on {table}: {key}")]
    ForeignKeyViolation { table: &'static str, key: String },
    #[error("row not found in {table}: {key}")]
    NotFound { table: &'static str, key: String },
    #[error("challenge {challenge} has a pending deletion")]
    PendingDeletion { challenge: String },
    /// Recoverable transport/store failure. Raised before any mutation is applied.
    #[error("store unavailable during {operation}")]
    Unavailable { operation: &'static str },
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserContact {
    Created,
    Unchanged,
    Renamed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionInsertOk {
    pub submission_id: SubmissionId,
    /// True only for the first correct row of a (user, challenge) pair, decided at insert time.
    pub first_correct_for_pair: bool,
    /// Points credited by this insert; non-zero only when `first_correct_for_pair`.
    pub points_awarded: u32,
}

/// In-memory document store for catalog, ledger, admin and pending-deletion tables.
#[derive(Debug, Clone, Default)]
pub struct FlagdeskStore {
    users: BTreeMap<UserId, UserRecord>,
    challenges: BTreeMap<ChallengeName, ChallengeRecord>,
    admins: BTreeMap<DisplayName, AdminRecord>,

    // Append-only; rows leave only through a challenge-scoped delete.
    submissions: Vec<SubmissionRecord>,
    next_submission_id: u64,
    // (user, challenge) pairs with at least one correct row.
    correct_pair_index: BTreeSet<(UserId, ChallengeName)>,

    pending_deletions: BTreeMap<ChallengeName, PendingDeletionRecord>,
}

impl FlagdeskStore {
    pub fn new_in_memory() -> Self {
        Self {
            next_submission_id: 1,
            ..Self::default()
        }
    }

    // ----- users -----

    pub fn upsert_user_on_first_contact(
        &mut self,
        user_id: UserId,
        display_name: Option<DisplayName>,
        now: TimestampMs,
    ) -> UserContact {
        let contact = match self.users.get_mut(&user_id) {
            None => {
                self.users.insert(
                    user_id,
                    UserRecord::first_contact_v1(user_id, display_name, now),
                );
                UserContact::Created
            }
            Some(existing) => match display_name {
                Some(name) if existing.display_name.as_ref() != Some(&name) => {
                    existing.display_name = Some(name);
                    UserContact::Renamed
                }
                _ => UserContact::Unchanged,
            },
        };
        if contact != UserContact::Unchanged {
            debug!(user_id = %user_id, contact = ?contact, "user contact recorded");
        }
        contact
    }

    pub fn user(&self, user_id: &UserId) -> Option<&UserRecord> {
        self.users.get(user_id)
    }

    pub fn users(&self) -> impl Iterator<Item = &UserRecord> {
        self.users.values()
    }

    /// Atomic arithmetic update of the denormalized points total.
    pub fn increment_points(
        &mut self,
        user_id: &UserId,
        delta: i64,
        scored_at: Option<TimestampMs>,
    ) -> Result<i64, StorageError> {
        let user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound {
                table: "users",
                key: user_id.to_string(),
            })?;
        user.points = user.points.saturating_add(delta);
        if let Some(at) = scored_at {
            user.last_scored_at = Some(at);
        }
        debug!(user_id = %user_id, delta, points = user.points, "points incremented");
        Ok(user.points)
    }

    pub fn set_points(&mut self, user_id: &UserId, points: i64) -> Result<(), StorageError> {
        let user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound {
                table: "users",
                key: user_id.to_string(),
            })?;
        debug!(user_id = %user_id, from = user.points, to = points, "points overwritten");
        user.points = points;
        Ok(())
    }

    // ----- catalog -----

    pub fn challenge(&self, name: &ChallengeName) -> Option<&ChallengeRecord> {
        self.challenges.get(name)
    }

    pub fn challenges(&self) -> impl Iterator<Item = &ChallengeRecord> {
        self.challenges.values()
    }

    pub fn challenges_by_category(&self, category: Category) -> Vec<&ChallengeRecord> {
        self.challenges
            .values()
            .filter(|c| c.category == category)
            .collect()
    }

    /// Full overwrite keyed by name; never a field merge.
    pub fn upsert_challenge(
        &mut self,
        record: ChallengeRecord,
    ) -> Result<UpsertOutcome, StorageError> {
        record.validate()?;
        if self.pending_deletions.contains_key(&record.name) {
            return Err(StorageError::PendingDeletion {
                challenge: record.name.as_str().to_string(),
            });
        }
        let name = record.name.clone();
        let outcome = match self.challenges.insert(name.clone(), record) {
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };
        debug!(challenge = %name, outcome = ?outcome, "challenge upserted");
        Ok(outcome)
    }

    pub fn delete_challenge(&mut self, name: &ChallengeName) -> bool {
        let removed = self.challenges.remove(name).is_some();
        debug!(challenge = %name, removed, "challenge deleted");
        removed
    }

    // ----- admins -----

    pub fn admin(&self, username: &DisplayName) -> Option<&AdminRecord> {
        self.admins.get(username)
    }

    pub fn admins(&self) -> impl Iterator<Item = &AdminRecord> {
        self.admins.values()
    }

    pub fn upsert_admin(&mut self, username: DisplayName, now: TimestampMs) -> UpsertOutcome {
        if self.admins.contains_key(&username) {
            return UpsertOutcome::Replaced;
        }
        debug!(username = %username, "admin granted");
        self.admins.insert(
            username.clone(),
            AdminRecord {
                username,
                granted_at: now,
            },
        );
        UpsertOutcome::Inserted
    }

    // ----- submissions -----

    /// Appends one attempt. The first correct row of a (user, challenge) pair also credits the
    /// challenge's points and stamps the scoring time in the same call, so a pair is never
    /// marked solved without its points.
    pub fn insert_submission(
        &mut self,
        input: SubmissionInput,
    ) -> Result<SubmissionInsertOk, StorageError> {
        input.validate()?;
        if !self.users.contains_key(&input.user_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "submissions.user_id",
                key: input.user_id.to_string(),
            });
        }
        let Some(points) = self.challenges.get(&input.challenge).map(|c| c.points) else {
            return Err(StorageError::ForeignKeyViolation {
                table: "submissions.challenge",
                key: input.challenge.as_str().to_string(),
            });
        };
        if self.pending_deletions.contains_key(&input.challenge) {
            return Err(StorageError::PendingDeletion {
                challenge: input.challenge.as_str().to_string(),
            });
        }

        let submission_id = SubmissionId(self.next_submission_id);
        let rec = SubmissionRecord::from_input_v1(submission_id, input)?;
        let pair = (rec.user_id, rec.challenge.clone());
        let first_correct_for_pair = rec.correct && !self.correct_pair_index.contains(&pair);
        let user = self
            .users
            .get_mut(&rec.user_id)
            .ok_or_else(|| StorageError::ForeignKeyViolation {
                table: "submissions.user_id",
                key: rec.user_id.to_string(),
            })?;

        let points_awarded = if first_correct_for_pair {
            user.points = user.points.saturating_add(i64::from(points));
            user.last_scored_at = Some(rec.submitted_at);
            self.correct_pair_index.insert(pair);
            points
        } else {
            0
        };
        self.next_submission_id = self.next_submission_id.saturating_add(1);
        debug!(
            submission_id = submission_id.0,
            user_id = %rec.user_id,
            challenge = %rec.challenge,
            correct = rec.correct,
            points_awarded,
            "submission inserted"
        );
        self.submissions.push(rec);
        Ok(SubmissionInsertOk {
            submission_id,
            first_correct_for_pair,
            points_awarded,
        })
    }

    pub fn submissions(&self) -> &[SubmissionRecord] {
        &self.submissions
    }

    pub fn submissions_by_user(
        &self,
        user_id: &UserId,
        correct_only: bool,
    ) -> Vec<&SubmissionRecord> {
        self.submissions
            .iter()
            .filter(|s| s.user_id == *user_id && (s.correct || !correct_only))
            .collect()
    }

    pub fn submissions_by_challenge(
        &self,
        name: &ChallengeName,
        correct_only: bool,
    ) -> Vec<&SubmissionRecord> {
        self.submissions
            .iter()
            .filter(|s| s.challenge == *name && (s.correct || !correct_only))
            .collect()
    }

    /// Deletion is scoped by challenge only; correctness never selects rows for removal.
    pub fn delete_submissions_by_challenge(&mut self, name: &ChallengeName) -> usize {
        let before = self.submissions.len();
        self.submissions.retain(|s| s.challenge != *name);
        self.correct_pair_index.retain(|(_, c)| c != name);
        let removed = before - self.submissions.len();
        debug!(challenge = %name, removed, "submissions deleted");
        removed
    }

    // ----- pending deletions -----

    /// Records the marker for a cascading delete. Returns the existing marker when the
    /// cascade was already started.
    pub fn begin_pending_deletion(
        &mut self,
        name: &ChallengeName,
        solvers: BTreeSet<UserId>,
        now: TimestampMs,
    ) -> Result<PendingDeletionRecord, StorageError> {
        if let Some(existing) = self.pending_deletions.get(name) {
            return Ok(existing.clone());
        }
        let challenge = self
            .challenges
            .get(name)
            .ok_or_else(|| StorageError::NotFound {
                table: "challenges",
                key: name.as_str().to_string(),
            })?;
        let marker = PendingDeletionRecord::v1(name.clone(), challenge.points, solvers, now);
        self.pending_deletions.insert(name.clone(), marker.clone());
        debug!(
            challenge = %name,
            solvers = marker.remaining_reversals.len(),
            "pending deletion recorded"
        );
        Ok(marker)
    }

    pub fn pending_deletion(&self, name: &ChallengeName) -> Option<&PendingDeletionRecord> {
        self.pending_deletions.get(name)
    }

    pub fn pending_deletions(&self) -> impl Iterator<Item = &PendingDeletionRecord> {
        self.pending_deletions.values()
    }

    /// Decrements one solver's points and clears them from the marker in a single step.
    /// Returns `false` when that solver was already reversed.
    pub fn apply_pending_reversal(
        &mut self,
        name: &ChallengeName,
        user_id: &UserId,
    ) -> Result<bool, StorageError> {
        let marker = self
            .pending_deletions
            .get_mut(name)
            .ok_or_else(|| StorageError::NotFound {
                table: "pending_deletions",
                key: name.as_str().to_string(),
            })?;
        if !marker.remaining_reversals.contains(user_id) {
            return Ok(false);
        }
        let user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| StorageError::ForeignKeyViolation {
                table: "pending_deletions.remaining_reversals",
                key: user_id.to_string(),
            })?;
        user.points = user.points.saturating_sub(i64::from(marker.points));
        marker.remaining_reversals.remove(user_id);
        marker.reversed_count = marker.reversed_count.saturating_add(1);
        debug!(
            challenge = %name,
            user_id = %user_id,
            points = marker.points,
            "pending reversal applied"
        );
        Ok(true)
    }

    /// Moves the marker forward; a stage never moves backwards.
    pub fn advance_pending_deletion(
        &mut self,
        name: &ChallengeName,
        stage: CascadeStage,
    ) -> Result<(), StorageError> {
        let marker = self
            .pending_deletions
            .get_mut(name)
            .ok_or_else(|| StorageError::NotFound {
                table: "pending_deletions",
                key: name.as_str().to_string(),
            })?;
        if stage > marker.stage {
            marker.stage = stage;
            debug!(challenge = %name, stage = stage.as_str(), "pending deletion advanced");
        }
        Ok(())
    }

    pub fn complete_pending_deletion(&mut self, name: &ChallengeName) -> bool {
        let removed = self.pending_deletions.remove(name).is_some();
        debug!(challenge = %name, removed, "pending deletion completed");
        removed
    }
}
