#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use flagdesk_kernel_contracts::catalog::{
    AdminRecord, Category, ChallengeName, ChallengeRecord, DifficultyLevel,
};
use flagdesk_kernel_contracts::identity::{DisplayName, UserId};
use flagdesk_kernel_contracts::ledger::{
    CascadeStage, PendingDeletionRecord, SubmissionInput, SubmissionRecord, UserRecord,
};
use flagdesk_kernel_contracts::TimestampMs;
use flagdesk_storage::repo::{AdminRepo, CatalogRepo, LedgerRepo, PendingDeletionRepo};
use flagdesk_storage::store::{SubmissionInsertOk, UpsertOutcome, UserContact};
use flagdesk_storage::{FlagdeskStore, StorageError};

pub fn uid(id: i64) -> UserId {
    UserId::new(id).unwrap()
}

pub fn challenge(name: &str, points: u32, secret: &str) -> ChallengeRecord {
    ChallengeRecord::v1(
        ChallengeName::new(name).unwrap(),
        Category::Crypto,
        DifficultyLevel::Easy,
        points,
        secret.to_string(),
        "https://files.local/chal".to_string(),
    )
    .unwrap()
}

pub fn store_with_users(ids: &[i64]) -> FlagdeskStore {
    let mut store = FlagdeskStore::new_in_memory();
    for id in ids {
        store.upsert_user_on_first_contact(
            uid(*id),
            Some(DisplayName::new(format!("user{id}")).unwrap()),
            TimestampMs(0),
        );
    }
    store
}

pub fn flaky(inner: FlagdeskStore) -> FlakyStore {
    FlakyStore {
        inner,
        fail_budget: RefCell::new(BTreeMap::new()),
        fail_always: BTreeSet::new(),
    }
}

/// Store wrapper that reports `Unavailable` for chosen operations before touching the inner store.
#[derive(Debug)]
pub struct FlakyStore {
    inner: FlagdeskStore,
    fail_budget: RefCell<BTreeMap<&'static str, u32>>,
    fail_always: BTreeSet<&'static str>,
}

impl FlakyStore {
    pub fn fail_times(&mut self, operation: &'static str, times: u32) {
        self.fail_budget.borrow_mut().insert(operation, times);
    }

    pub fn fail_always(&mut self, operation: &'static str) {
        self.fail_always.insert(operation);
    }

    pub fn heal(&mut self) {
        self.fail_budget.borrow_mut().clear();
        self.fail_always.clear();
    }

    pub fn inner(&self) -> &FlagdeskStore {
        &self.inner
    }

    pub fn into_inner(self) -> FlagdeskStore {
        self.inner
    }

    fn gate(&self, operation: &'static str) -> Result<(), StorageError> {
        if self.fail_always.contains(operation) {
            return Err(StorageError::Unavailable { operation });
        }
        let mut budget = self.fail_budget.borrow_mut();
        if let Some(left) = budget.get_mut(operation) {
            if *left > 0 {
                *left -= 1;
                return Err(StorageError::Unavailable { operation });
            }
        }
        Ok(())
    }
}

impl CatalogRepo for FlakyStore {
    fn find_challenge_row(
        &self,
        name: &ChallengeName,
    ) -> Result<Option<ChallengeRecord>, StorageError> {
        self.gate("find_challenge_row")?;
        self.inner.find_challenge_row(name)
    }

    fn find_challenge_rows_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<ChallengeRecord>, StorageError> {
        self.gate("find_challenge_rows_by_category")?;
        self.inner.find_challenge_rows_by_category(category)
    }

    fn challenge_rows(&self) -> Result<Vec<ChallengeRecord>, StorageError> {
        self.gate("challenge_rows")?;
        self.inner.challenge_rows()
    }

    fn upsert_challenge_row(
        &mut self,
        record: ChallengeRecord,
    ) -> Result<UpsertOutcome, StorageError> {
        self.gate("upsert_challenge_row")?;
        self.inner.upsert_challenge_row(record)
    }

    fn delete_challenge_row(&mut self, name: &ChallengeName) -> Result<bool, StorageError> {
        self.gate("delete_challenge_row")?;
        self.inner.delete_challenge_row(name)
    }
}

impl AdminRepo for FlakyStore {
    fn find_admin_row(&self, username: &DisplayName) -> Result<Option<AdminRecord>, StorageError> {
        self.gate("find_admin_row")?;
        self.inner.find_admin_row(username)
    }

    fn upsert_admin_row(
        &mut self,
        username: DisplayName,
        now: TimestampMs,
    ) -> Result<UpsertOutcome, StorageError> {
        self.gate("upsert_admin_row")?;
        self.inner.upsert_admin_row(username, now)
    }
}

impl LedgerRepo for FlakyStore {
    fn insert_submission_row(
        &mut self,
        input: SubmissionInput,
    ) -> Result<SubmissionInsertOk, StorageError> {
        self.gate("insert_submission_row")?;
        self.inner.insert_submission_row(input)
    }

    fn find_submission_rows_by_user(
        &self,
        user_id: &UserId,
        correct_only: bool,
    ) -> Result<Vec<SubmissionRecord>, StorageError> {
        self.gate("find_submission_rows_by_user")?;
        self.inner.find_submission_rows_by_user(user_id, correct_only)
    }

    fn find_submission_rows_by_challenge(
        &self,
        name: &ChallengeName,
        correct_only: bool,
    ) -> Result<Vec<SubmissionRecord>, StorageError> {
        self.gate("find_submission_rows_by_challenge")?;
        self.inner.find_submission_rows_by_challenge(name, correct_only)
    }

    fn submission_rows(&self) -> Result<Vec<SubmissionRecord>, StorageError> {
        self.gate("submission_rows")?;
        self.inner.submission_rows()
    }

    fn delete_submission_rows_by_challenge(
        &mut self,
        name: &ChallengeName,
    ) -> Result<usize, StorageError> {
        self.gate("delete_submission_rows_by_challenge")?;
        self.inner.delete_submission_rows_by_challenge(name)
    }

    fn increment_points_row(
        &mut self,
        user_id: &UserId,
        delta: i64,
        scored_at: Option<TimestampMs>,
    ) -> Result<i64, StorageError> {
        self.gate("increment_points_row")?;
        self.inner.increment_points_row(user_id, delta, scored_at)
    }

    fn set_points_row(&mut self, user_id: &UserId, points: i64) -> Result<(), StorageError> {
        self.gate("set_points_row")?;
        self.inner.set_points_row(user_id, points)
    }

    fn find_user_row(&self, user_id: &UserId) -> Result<Option<UserRecord>, StorageError> {
        self.gate("find_user_row")?;
        self.inner.find_user_row(user_id)
    }

    fn upsert_user_row_on_first_contact(
        &mut self,
        user_id: UserId,
        display_name: Option<DisplayName>,
        now: TimestampMs,
    ) -> Result<UserContact, StorageError> {
        self.gate("upsert_user_row_on_first_contact")?;
        self.inner
            .upsert_user_row_on_first_contact(user_id, display_name, now)
    }

    fn user_rows(&self) -> Result<Vec<UserRecord>, StorageError> {
        self.gate("user_rows")?;
        self.inner.user_rows()
    }
}

impl PendingDeletionRepo for FlakyStore {
    fn begin_pending_deletion_row(
        &mut self,
        name: &ChallengeName,
        solvers: BTreeSet<UserId>,
        now: TimestampMs,
    ) -> Result<PendingDeletionRecord, StorageError> {
        self.gate("begin_pending_deletion_row")?;
        self.inner.begin_pending_deletion_row(name, solvers, now)
    }

    fn find_pending_deletion_row(
        &self,
        name: &ChallengeName,
    ) -> Result<Option<PendingDeletionRecord>, StorageError> {
        self.gate("find_pending_deletion_row")?;
        self.inner.find_pending_deletion_row(name)
    }

    fn pending_deletion_rows(&self) -> Result<Vec<PendingDeletionRecord>, StorageError> {
        self.gate("pending_deletion_rows")?;
        self.inner.pending_deletion_rows()
    }

    fn apply_pending_reversal_row(
        &mut self,
        name: &ChallengeName,
        user_id: &UserId,
    ) -> Result<bool, StorageError> {
        self.gate("apply_pending_reversal_row")?;
        self.inner.apply_pending_reversal_row(name, user_id)
    }

    fn advance_pending_deletion_row(
        &mut self,
        name: &ChallengeName,
        stage: CascadeStage,
    ) -> Result<(), StorageError> {
        self.gate("advance_pending_deletion_row")?;
        self.inner.advance_pending_deletion_row(name, stage)
    }

    fn complete_pending_deletion_row(
        &mut self,
        name: &ChallengeName,
    ) -> Result<bool, StorageError> {
        self.gate("complete_pending_deletion_row")?;
        self.inner.complete_pending_deletion_row(name)
    }
}
