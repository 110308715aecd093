#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use flagdesk_kernel_contracts::catalog::{
    Category, ChallengeName, ChallengeRecord, DifficultyLevel,
};
use flagdesk_kernel_contracts::identity::UserId;
use flagdesk_kernel_contracts::ledger::{CascadeStage, SubmissionInput};
use flagdesk_kernel_contracts::TimestampMs;
use flagdesk_storage::repo::{CatalogRepo, LedgerRepo, PendingDeletionRepo};
use flagdesk_storage::{FlagdeskStore, StorageError};

fn user(id: i64) -> UserId {
    UserId::new(id).unwrap()
}

fn name(raw: &str) -> ChallengeName {
    ChallengeName::new(raw).unwrap()
}

fn record(points: u32) -> ChallengeRecord {
    ChallengeRecord::v1(
        name("heap"),
        Category::Pwn,
        DifficultyLevel::Hard,
        points,
        "flag{heap}".to_string(),
        "https://t.me/c/ctf/9".to_string(),
    )
    .unwrap()
}

fn seeded() -> FlagdeskStore {
    let mut s = FlagdeskStore::new_in_memory();
    s.upsert_challenge_row(record(300)).unwrap();
    for id in [1, 2] {
        s.upsert_user_row_on_first_contact(user(id), None, TimestampMs(1))
            .unwrap();
        s.increment_points_row(&user(id), 300, Some(TimestampMs(2)))
            .unwrap();
    }
    s
}

#[test]
fn at_pending_db_01_begin_is_idempotent() {
    let mut s = seeded();
    let solvers: BTreeSet<UserId> = [user(1), user(2)].into_iter().collect();
    let first = s
        .begin_pending_deletion_row(&name("heap"), solvers.clone(), TimestampMs(10))
        .unwrap();
    let second = s
        .begin_pending_deletion_row(&name("heap"), BTreeSet::new(), TimestampMs(11))
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.points, 300);
    assert_eq!(first.remaining_reversals, solvers);
    assert_eq!(first.stage, CascadeStage::ReversingPoints);
}

#[test]
fn at_pending_db_02_reversal_applies_once_per_solver() {
    let mut s = seeded();
    let solvers: BTreeSet<UserId> = [user(1), user(2)].into_iter().collect();
    s.begin_pending_deletion_row(&name("heap"), solvers, TimestampMs(10))
        .unwrap();

    assert!(s.apply_pending_reversal_row(&name("heap"), &user(1)).unwrap());
    assert!(!s.apply_pending_reversal_row(&name("heap"), &user(1)).unwrap());
    assert_eq!(s.find_user_row(&user(1)).unwrap().unwrap().points, 0);
    assert_eq!(s.find_user_row(&user(2)).unwrap().unwrap().points, 300);

    let marker = s.find_pending_deletion_row(&name("heap")).unwrap().unwrap();
    assert_eq!(marker.reversed_count, 1);
    assert_eq!(
        marker.remaining_reversals,
        [user(2)].into_iter().collect::<BTreeSet<_>>()
    );
}

#[test]
fn at_pending_db_03_marker_blocks_new_writes() {
    let mut s = seeded();
    s.begin_pending_deletion_row(&name("heap"), BTreeSet::new(), TimestampMs(10))
        .unwrap();
    let attempt = SubmissionInput::v1(
        user(1),
        name("heap"),
        "flag{heap}".to_string(),
        true,
        TimestampMs(11),
    )
    .unwrap();
    assert!(matches!(
        s.insert_submission_row(attempt),
        Err(StorageError::PendingDeletion { .. })
    ));
    assert!(matches!(
        s.upsert_challenge_row(record(10)),
        Err(StorageError::PendingDeletion { .. })
    ));
}

#[test]
fn at_pending_db_04_stage_only_moves_forward() {
    let mut s = seeded();
    s.begin_pending_deletion_row(&name("heap"), BTreeSet::new(), TimestampMs(10))
        .unwrap();
    s.advance_pending_deletion_row(&name("heap"), CascadeStage::DeletingChallenge)
        .unwrap();
    s.advance_pending_deletion_row(&name("heap"), CascadeStage::DeletingSubmissions)
        .unwrap();
    let marker = s.find_pending_deletion_row(&name("heap")).unwrap().unwrap();
    assert_eq!(marker.stage, CascadeStage::DeletingChallenge);

    assert!(s.complete_pending_deletion_row(&name("heap")).unwrap());
    assert!(s.pending_deletion_rows().unwrap().is_empty());
}

#[test]
fn at_pending_db_05_begin_requires_existing_challenge() {
    let mut s = FlagdeskStore::new_in_memory();
    assert!(matches!(
        s.begin_pending_deletion_row(&name("heap"), BTreeSet::new(), TimestampMs(1)),
        Err(StorageError::NotFound { .. })
    ));
}
