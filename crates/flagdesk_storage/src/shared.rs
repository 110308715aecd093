#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use flagdesk_kernel_contracts::catalog::{AdminRecord, Category, ChallengeName, ChallengeRecord};
use flagdesk_kernel_contracts::identity::{DisplayName, UserId};
use flagdesk_kernel_contracts::ledger::{
    CascadeStage, PendingDeletionRecord, SubmissionInput, SubmissionRecord, UserRecord,
};
use flagdesk_kernel_contracts::TimestampMs;

use crate::repo::{AdminRepo, CatalogRepo, LedgerRepo, PendingDeletionRepo};
use crate::store::{FlagdeskStore, StorageError, SubmissionInsertOk, UpsertOutcome, UserContact};

/// Cloneable handle to one store shared across request workers.
///
/// The lock is taken per repo call and released before the call returns, so a caller waiting
/// out a retry backoff never blocks other callers. Each store method is atomic on its own;
/// multi-call sequences interleave with other handles.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<FlagdeskStore>>,
}

impl SharedStore {
    pub fn new(store: FlagdeskStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlagdeskStore> {
        // Store methods validate before mutating, so a panicked holder cannot leave a torn row.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CatalogRepo for SharedStore {
    fn find_challenge_row(
        &self,
        name: &ChallengeName,
    ) -> Result<Option<ChallengeRecord>, StorageError> {
        self.lock().find_challenge_row(name)
    }

    fn find_challenge_rows_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<ChallengeRecord>, StorageError> {
        self.lock().find_challenge_rows_by_category(category)
    }

    fn challenge_rows(&self) -> Result<Vec<ChallengeRecord>, StorageError> {
        self.lock().challenge_rows()
    }

    fn upsert_challenge_row(
        &mut self,
        record: ChallengeRecord,
    ) -> Result<UpsertOutcome, StorageError> {
        self.lock().upsert_challenge_row(record)
    }

    fn delete_challenge_row(&mut self, name: &ChallengeName) -> Result<bool, StorageError> {
        self.lock().delete_challenge_row(name)
    }
}

impl AdminRepo for SharedStore {
    fn find_admin_row(&self, username: &DisplayName) -> Result<Option<AdminRecord>, StorageError> {
        self.lock().find_admin_row(username)
    }

    fn upsert_admin_row(
        &mut self,
        username: DisplayName,
        now: TimestampMs,
    ) -> Result<UpsertOutcome, StorageError> {
        self.lock().upsert_admin_row(username, now)
    }
}

impl LedgerRepo for SharedStore {
    fn insert_submission_row(
        &mut self,
        input: SubmissionInput,
    ) -> Result<SubmissionInsertOk, StorageError> {
        self.lock().insert_submission_row(input)
    }

    fn find_submission_rows_by_user(
        &self,
        user_id: &UserId,
        correct_only: bool,
    ) -> Result<Vec<SubmissionRecord>, StorageError> {
        self.lock().find_submission_rows_by_user(user_id, correct_only)
    }

    fn find_submission_rows_by_challenge(
        &self,
        name: &ChallengeName,
        correct_only: bool,
    ) -> Result<Vec<SubmissionRecord>, StorageError> {
        self.lock().find_submission_rows_by_challenge(name, correct_only)
    }

    fn submission_rows(&self) -> Result<Vec<SubmissionRecord>, StorageError> {
        self.lock().submission_rows()
    }

    fn delete_submission_rows_by_challenge(
        &mut self,
        name: &ChallengeName,
    ) -> Result<usize, StorageError> {
        self.lock().delete_submission_rows_by_challenge(name)
    }

    fn increment_points_row(
        &mut self,
        user_id: &UserId,
        delta: i64,
        scored_at: Option<TimestampMs>,
    ) -> Result<i64, StorageError> {
        self.lock().increment_points_row(user_id, delta, scored_at)
    }

    fn set_points_row(&mut self, user_id: &UserId, points: i64) -> Result<(), StorageError> {
        self.lock().set_points_row(user_id, points)
    }

    fn find_user_row(&self, user_id: &UserId) -> Result<Option<UserRecord>, StorageError> {
        self.lock().find_user_row(user_id)
    }

    fn upsert_user_row_on_first_contact(
        &mut self,
        user_id: UserId,
        display_name: Option<DisplayName>,
        now: TimestampMs,
    ) -> Result<UserContact, StorageError> {
        self.lock()
            .upsert_user_row_on_first_contact(user_id, display_name, now)
    }

    fn user_rows(&self) -> Result<Vec<UserRecord>, StorageError> {
        self.lock().user_rows()
    }
}

impl PendingDeletionRepo for SharedStore {
    fn begin_pending_deletion_row(
        &mut self,
        name: &ChallengeName,
        solvers: BTreeSet<UserId>,
        now: TimestampMs,
    ) -> Result<PendingDeletionRecord, StorageError> {
        self.lock().begin_pending_deletion_row(name, solvers, now)
    }

    fn find_pending_deletion_row(
        &self,
        name: &ChallengeName,
    ) -> Result<Option<PendingDeletionRecord>, StorageError> {
        self.lock().find_pending_deletion_row(name)
    }

    fn pending_deletion_rows(&self) -> Result<Vec<PendingDeletionRecord>, StorageError> {
        self.lock().pending_deletion_rows()
    }

    fn apply_pending_reversal_row(
        &mut self,
        name: &ChallengeName,
        user_id: &UserId,
    ) -> Result<bool, StorageError> {
        self.lock().apply_pending_reversal_row(name, user_id)
    }

    fn advance_pending_deletion_row(
        &mut self,
        name: &ChallengeName,
        stage: CascadeStage,
    ) -> Result<(), StorageError> {
        self.lock().advance_pending_deletion_row(name, stage)
    }

    fn complete_pending_deletion_row(
        &mut self,
        name: &ChallengeName,
    ) -> Result<bool, StorageError> {
        self.lock().complete_pending_deletion_row(name)
    }
}
