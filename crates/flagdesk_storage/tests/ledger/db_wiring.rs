#![forbid(unsafe_code)]

use flagdesk_kernel_contracts::catalog::{
    Category, ChallengeName, ChallengeRecord, DifficultyLevel,
};
use flagdesk_kernel_contracts::identity::{DisplayName, UserId};
use flagdesk_kernel_contracts::ledger::SubmissionInput;
use flagdesk_kernel_contracts::TimestampMs;
use flagdesk_storage::repo::{CatalogRepo, LedgerRepo};
use flagdesk_storage::store::UserContact;
use flagdesk_storage::{FlagdeskStore, SharedStore, StorageError};

fn user(id: i64) -> UserId {
    UserId::new(id).unwrap()
}

fn name(raw: &str) -> ChallengeName {
    ChallengeName::new(raw).unwrap()
}

fn seed(store: &mut FlagdeskStore) {
    store
        .upsert_challenge_row(
            ChallengeRecord::v1(
                name("xor"),
                Category::Crypto,
                DifficultyLevel::Easy,
                50,
                "flag{xor}".to_string(),
                "https://t.me/c/ctf/1".to_string(),
            )
            .unwrap(),
        )
        .unwrap();
    for id in [1, 2] {
        store
            .upsert_user_row_on_first_contact(
                user(id),
                Some(DisplayName::new(format!("user{id}")).unwrap()),
                TimestampMs(1),
            )
            .unwrap();
    }
}

fn attempt(user_id: i64, token: &str, correct: bool, at: u64) -> SubmissionInput {
    SubmissionInput::v1(
        user(user_id),
        name("xor"),
        token.to_string(),
        correct,
        TimestampMs(at),
    )
    .unwrap()
}

#[test]
fn at_ledger_db_01_first_contact_creates_then_renames() {
    let mut s = FlagdeskStore::new_in_memory();
    let id = user(9);
    assert_eq!(
        s.upsert_user_row_on_first_contact(id, None, TimestampMs(5))
            .unwrap(),
        UserContact::Created
    );
    assert_eq!(
        s.upsert_user_row_on_first_contact(id, None, TimestampMs(6))
            .unwrap(),
        UserContact::Unchanged
    );
    assert_eq!(
        s.upsert_user_row_on_first_contact(
            id,
            Some(DisplayName::new("neo").unwrap()),
            TimestampMs(7)
        )
        .unwrap(),
        UserContact::Renamed
    );
    let row = s.find_user_row(&id).unwrap().unwrap();
    assert_eq!(row.points, 0);
    assert_eq!(row.registered_at, TimestampMs(5));
    assert_eq!(row.display_name_or_unknown(), "neo");
}

#[test]
fn at_ledger_db_02_every_attempt_is_retained() {
    let mut s = FlagdeskStore::new_in_memory();
    seed(&mut s);
    s.insert_submission_row(attempt(1, "nope", false, 10)).unwrap();
    s.insert_submission_row(attempt(1, "flag{xor}", true, 11))
        .unwrap();
    s.insert_submission_row(attempt(2, "nope", false, 12)).unwrap();

    assert_eq!(s.submission_rows().unwrap().len(), 3);
    assert_eq!(
        s.find_submission_rows_by_user(&user(1), false).unwrap().len(),
        2
    );
    assert_eq!(
        s.find_submission_rows_by_user(&user(1), true).unwrap().len(),
        1
    );
    assert_eq!(
        s.find_submission_rows_by_challenge(&name("xor"), true)
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn at_ledger_db_03_first_correct_is_decided_at_insert() {
    let mut s = FlagdeskStore::new_in_memory();
    seed(&mut s);
    let wrong = s.insert_submission_row(attempt(1, "nope", false, 10)).unwrap();
    let first = s
        .insert_submission_row(attempt(1, "flag{xor}", true, 11))
        .unwrap();
    let dup = s
        .insert_submission_row(attempt(1, "flag{xor}", true, 12))
        .unwrap();
    let other = s
        .insert_submission_row(attempt(2, "flag{xor}", true, 13))
        .unwrap();

    assert!(!wrong.first_correct_for_pair);
    assert!(first.first_correct_for_pair);
    assert!(!dup.first_correct_for_pair);
    assert!(other.first_correct_for_pair);
    assert!(first.submission_id < dup.submission_id);

    // Points are credited by the same insert that marks the pair solved.
    assert_eq!(
        (wrong.points_awarded, first.points_awarded, dup.points_awarded),
        (0, 50, 0)
    );
    let row = s.find_user_row(&user(1)).unwrap().unwrap();
    assert_eq!(row.points, 50);
    assert_eq!(row.last_scored_at, Some(TimestampMs(11)));
    assert_eq!(s.find_user_row(&user(2)).unwrap().unwrap().points, 50);
}

#[test]
fn at_ledger_db_07_rejected_insert_changes_nothing() {
    let mut s = FlagdeskStore::new_in_memory();
    seed(&mut s);
    let ghost = SubmissionInput::v1(
        user(1),
        name("ghost"),
        "flag{xor}".to_string(),
        true,
        TimestampMs(5),
    )
    .unwrap();
    assert!(s.insert_submission_row(ghost).is_err());
    assert!(s.submission_rows().unwrap().is_empty());
    assert_eq!(s.find_user_row(&user(1)).unwrap().unwrap().points, 0);

    let first = s
        .insert_submission_row(attempt(1, "flag{xor}", true, 6))
        .unwrap();
    assert!(first.first_correct_for_pair);
    assert_eq!(first.submission_id.0, 1);
}

#[test]
fn at_ledger_db_04_foreign_keys_enforced() {
    let mut s = FlagdeskStore::new_in_memory();
    seed(&mut s);
    let unknown_user = s.insert_submission_row(attempt(77, "x", false, 1));
    assert!(matches!(
        unknown_user,
        Err(StorageError::ForeignKeyViolation {
            table: "submissions.user_id",
            ..
        })
    ));

    let unknown_challenge = s.insert_submission_row(
        SubmissionInput::v1(
            user(1),
            name("ghost"),
            "x".to_string(),
            false,
            TimestampMs(1),
        )
        .unwrap(),
    );
    assert!(matches!(
        unknown_challenge,
        Err(StorageError::ForeignKeyViolation {
            table: "submissions.challenge",
            ..
        })
    ));
}

#[test]
fn at_ledger_db_05_increment_is_arithmetic_and_stamps() {
    let mut s = FlagdeskStore::new_in_memory();
    seed(&mut s);
    assert_eq!(
        s.increment_points_row(&user(1), 50, Some(TimestampMs(20)))
            .unwrap(),
        50
    );
    assert_eq!(s.increment_points_row(&user(1), 25, None).unwrap(), 75);
    let row = s.find_user_row(&user(1)).unwrap().unwrap();
    assert_eq!(row.points, 75);
    assert_eq!(row.last_scored_at, Some(TimestampMs(20)));
    assert!(matches!(
        s.increment_points_row(&user(404), 1, None),
        Err(StorageError::NotFound { .. })
    ));
}

#[test]
fn at_ledger_db_06_delete_by_challenge_resets_pair_index() {
    let mut s = FlagdeskStore::new_in_memory();
    seed(&mut s);
    s.insert_submission_row(attempt(1, "flag{xor}", true, 11))
        .unwrap();
    s.insert_submission_row(attempt(2, "nope", false, 12)).unwrap();
    assert_eq!(
        s.delete_submission_rows_by_challenge(&name("xor")).unwrap(),
        2
    );
    assert!(s.submission_rows().unwrap().is_empty());

    let again = s
        .insert_submission_row(attempt(1, "flag{xor}", true, 30))
        .unwrap();
    assert!(again.first_correct_for_pair);
}

#[test]
fn at_ledger_db_08_shared_handles_see_one_store() {
    let mut seeded = FlagdeskStore::new_in_memory();
    seed(&mut seeded);
    let mut a = SharedStore::new(seeded);
    let mut b = a.clone();

    let worker = std::thread::spawn(move || {
        b.insert_submission_row(attempt(2, "flag{xor}", true, 20))
            .unwrap()
    });
    let mine = a
        .insert_submission_row(attempt(1, "flag{xor}", true, 21))
        .unwrap();
    let theirs = worker.join().unwrap();

    assert_ne!(mine.submission_id, theirs.submission_id);
    assert_eq!(a.submission_rows().unwrap().len(), 2);
    assert_eq!(a.find_user_row(&user(1)).unwrap().unwrap().points, 50);
    assert_eq!(a.find_user_row(&user(2)).unwrap().unwrap().points, 50);
}
