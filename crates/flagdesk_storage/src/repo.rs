#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use flagdesk_kernel_contracts::catalog::{AdminRecord, Category, ChallengeName, ChallengeRecord};
use flagdesk_kernel_contracts::identity::{DisplayName, UserId};
use flagdesk_kernel_contracts::ledger::{
    CascadeStage, PendingDeletionRecord, SubmissionInput, SubmissionRecord, UserRecord,
};
use flagdesk_kernel_contracts::TimestampMs;

use crate::store::{
    FlagdeskStore, StorageError, SubmissionInsertOk, UpsertOutcome, UserContact,
};

/// Typed repository interface for the challenge catalog.
pub trait CatalogRepo {
    fn find_challenge_row(
        &self,
        name: &ChallengeName,
    ) -> Result<Option<ChallengeRecord>, StorageError>;
    fn find_challenge_rows_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<ChallengeRecord>, StorageError>;
    fn challenge_rows(&self) -> Result<Vec<ChallengeRecord>, StorageError>;
    fn upsert_challenge_row(
        &mut self,
        record: ChallengeRecord,
    ) -> Result<UpsertOutcome, StorageError>;
    fn delete_challenge_row(&mut self, name: &ChallengeName) -> Result<bool, StorageError>;
}

/// Typed repository interface for admin grants (keyed by display name).
pub trait AdminRepo {
    fn find_admin_row(&self, username: &DisplayName) -> Result<Option<AdminRecord>, StorageError>;
    fn upsert_admin_row(
        &mut self,
        username: DisplayName,
        now: TimestampMs,
    ) -> Result<UpsertOutcome, StorageError>;
}

/// Typed repository interface for the scoring ledger: users and append-only submissions.
pub trait LedgerRepo {
    fn insert_submission_row(
        &mut self,
        input: SubmissionInput,
    ) -> Result<SubmissionInsertOk, StorageError>;
    fn find_submission_rows_by_user(
        &self,
        user_id: &UserId,
        correct_only: bool,
    ) -> Result<Vec<SubmissionRecord>, StorageError>;
    fn find_submission_rows_by_challenge(
        &self,
        name: &ChallengeName,
        correct_only: bool,
    ) -> Result<Vec<SubmissionRecord>, StorageError>;
    fn submission_rows(&self) -> Result<Vec<SubmissionRecord>, StorageError>;
    fn delete_submission_rows_by_challenge(
        &mut self,
        name: &ChallengeName,
    ) -> Result<usize, StorageError>;

    fn increment_points_row(
        &mut self,
        user_id: &UserId,
        delta: i64,
        scored_at: Option<TimestampMs>,
    ) -> Result<i64, StorageError>;
    fn set_points_row(&mut self, user_id: &UserId, points: i64) -> Result<(), StorageError>;
    fn find_user_row(&self, user_id: &UserId) -> Result<Option<UserRecord>, StorageError>;
    fn upsert_user_row_on_first_contact(
        &mut self,
        user_id: UserId,
        display_name: Option<DisplayName>,
        now: TimestampMs,
    ) -> Result<UserContact, StorageError>;
    fn user_rows(&self) -> Result<Vec<UserRecord>, StorageError>;
}

/// Typed repository interface for resumable cascading deletes.
pub trait PendingDeletionRepo {
    fn begin_pending_deletion_row(
        &mut self,
        name: &ChallengeName,
        solvers: BTreeSet<UserId>,
        now: TimestampMs,
    ) -> Result<PendingDeletionRecord, StorageError>;
    fn find_pending_deletion_row(
        &self,
        name: &ChallengeName,
    ) -> Result<Option<PendingDeletionRecord>, StorageError>;
    fn pending_deletion_rows(&self) -> Result<Vec<PendingDeletionRecord>, StorageError>;
    fn apply_pending_reversal_row(
        &mut self,
        name: &ChallengeName,
        user_id: &UserId,
    ) -> Result<bool, StorageError>;
    fn advance_pending_deletion_row(
        &mut self,
        name: &ChallengeName,
        stage: CascadeStage,
    ) -> Result<(), StorageError>;
    fn complete_pending_deletion_row(&mut self, name: &ChallengeName)
        -> Result<bool, StorageError>;
}

/// Everything the orchestration layer needs from a store.
pub trait FlagdeskRepo: CatalogRepo + AdminRepo + LedgerRepo + PendingDeletionRepo {}

impl<T> FlagdeskRepo for T where T: CatalogRepo + AdminRepo + LedgerRepo + PendingDeletionRepo {}

impl CatalogRepo for FlagdeskStore {
    fn find_challenge_row(
        &self,
        name: &ChallengeName,
    ) -> Result<Option<ChallengeRecord>, StorageError> {
        Ok(self.challenge(name).cloned())
    }

    fn find_challenge_rows_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<ChallengeRecord>, StorageError> {
        Ok(self
            .challenges_by_category(category)
            .into_iter()
            .cloned()
            .collect())
    }

    fn challenge_rows(&self) -> Result<Vec<ChallengeRecord>, StorageError> {
        Ok(self.challenges().cloned().collect())
    }

    fn upsert_challenge_row(
        &mut self,
        record: ChallengeRecord,
    ) -> Result<UpsertOutcome, StorageError> {
        self.upsert_challenge(record)
    }

    fn delete_challenge_row(&mut self, name: &ChallengeName) -> Result<bool, StorageError> {
        Ok(self.delete_challenge(name))
    }
}

impl AdminRepo for FlagdeskStore {
    fn find_admin_row(&self, username: &DisplayName) -> Result<Option<AdminRecord>, StorageError> {
        Ok(self.admin(username).cloned())
    }

    fn upsert_admin_row(
        &mut self,
        username: DisplayName,
        now: TimestampMs,
    ) -> Result<UpsertOutcome, StorageError> {
        Ok(self.upsert_admin(username, now))
    }
}

impl LedgerRepo for FlagdeskStore {
    fn insert_submission_row(
        &mut self,
        input: SubmissionInput,
    ) -> Result<SubmissionInsertOk, StorageError> {
        self.insert_submission(input)
    }

    fn find_submission_rows_by_user(
        &self,
        user_id: &UserId,
        correct_only: bool,
    ) -> Result<Vec<SubmissionRecord>, StorageError> {
        Ok(self
            .submissions_by_user(user_id, correct_only)
            .into_iter()
            .cloned()
            .collect())
    }

    fn find_submission_rows_by_challenge(
        &self,
        name: &ChallengeName,
        correct_only: bool,
    ) -> Result<Vec<SubmissionRecord>, StorageError> {
        Ok(self
            .submissions_by_challenge(name, correct_only)
            .into_iter()
            .cloned()
            .collect())
    }

    fn submission_rows(&self) -> Result<Vec<SubmissionRecord>, StorageError> {
        Ok(self.submissions().to_vec())
    }

    fn delete_submission_rows_by_challenge(
        &mut self,
        name: &ChallengeName,
    ) -> Result<usize, StorageError> {
        Ok(self.delete_submissions_by_challenge(name))
    }

    fn increment_points_row(
        &mut self,
        user_id: &UserId,
        delta: i64,
        scored_at: Option<TimestampMs>,
    ) -> Result<i64, StorageError> {
        self.increment_points(user_id, delta, scored_at)
    }

    fn set_points_row(&mut self, user_id: &UserId, points: i64) -> Result<(), StorageError> {
        self.set_points(user_id, points)
    }

    fn find_user_row(&self, user_id: &UserId) -> Result<Option<UserRecord>, StorageError> {
        Ok(self.user(user_id).cloned())
    }

    fn upsert_user_row_on_first_contact(
        &mut self,
        user_id: UserId,
        display_name: Option<DisplayName>,
        now: TimestampMs,
    ) -> Result<UserContact, StorageError> {
        Ok(self.upsert_user_on_first_contact(user_id, display_name, now))
    }

    fn user_rows(&self) -> Result<Vec<UserRecord>, StorageError> {
        Ok(self.users().cloned().collect())
    }
}

impl PendingDeletionRepo for FlagdeskStore {
    fn begin_pending_deletion_row(
        &mut self,
        name: &ChallengeName,
        solvers: BTreeSet<UserId>,
        now: TimestampMs,
    ) -> Result<PendingDeletionRecord, StorageError> {
        self.begin_pending_deletion(name, solvers, now)
    }

    fn find_pending_deletion_row(
        &self,
        name: &ChallengeName,
    ) -> Result<Option<PendingDeletionRecord>, StorageError> {
        Ok(self.pending_deletion(name).cloned())
    }

    fn pending_deletion_rows(&self) -> Result<Vec<PendingDeletionRecord>, StorageError> {
        Ok(self.pending_deletions().cloned().collect())
    }

    fn apply_pending_reversal_row(
        &mut self,
        name: &ChallengeName,
        user_id: &UserId,
    ) -> Result<bool, StorageError> {
        self.apply_pending_reversal(name, user_id)
    }

    fn advance_pending_deletion_row(
        &mut self,
        name: &ChallengeName,
        stage: CascadeStage,
    ) -> Result<(), StorageError> {
        self.advance_pending_deletion(name, stage)
    }

    fn complete_pending_deletion_row(
        &mut self,
        name: &ChallengeName,
    ) -> Result<bool, StorageError> {
        Ok(self.complete_pending_deletion(name))
    }
}
