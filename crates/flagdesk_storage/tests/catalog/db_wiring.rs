#![forbid(unsafe_code)]

use flagdesk_kernel_contracts::catalog::{
    Category, ChallengeName, ChallengeRecord, DifficultyLevel,
};
use flagdesk_kernel_contracts::identity::DisplayName;
use flagdesk_kernel_contracts::TimestampMs;
use flagdesk_storage::repo::{AdminRepo, CatalogRepo};
use flagdesk_storage::store::UpsertOutcome;
use flagdesk_storage::FlagdeskStore;

fn name(raw: &str) -> ChallengeName {
    ChallengeName::new(raw).unwrap()
}

fn challenge(raw: &str, category: Category, points: u32, secret: &str) -> ChallengeRecord {
    ChallengeRecord::v1(
        name(raw),
        category,
        DifficultyLevel::Medium,
        points,
        secret.to_string(),
        format!("https://t.me/c/ctf/{raw}"),
    )
    .unwrap()
}

#[test]
fn at_catalog_db_01_upsert_is_full_overwrite() {
    let mut s = FlagdeskStore::new_in_memory();
    let first = challenge("ret2win", Category::Pwn, 200, "flag{one}");
    assert_eq!(
        s.upsert_challenge_row(first).unwrap(),
        UpsertOutcome::Inserted
    );

    let mut second = challenge("ret2win", Category::Reverse, 50, "flag{two}");
    second.level = DifficultyLevel::Hard;
    assert_eq!(
        s.upsert_challenge_row(second.clone()).unwrap(),
        UpsertOutcome::Replaced
    );

    let stored = s.find_challenge_row(&name("ret2win")).unwrap().unwrap();
    assert_eq!(stored, second);
    assert_eq!(s.challenge_rows().unwrap().len(), 1);
}

#[test]
fn at_catalog_db_02_find_by_category_filters() {
    let mut s = FlagdeskStore::new_in_memory();
    s.upsert_challenge_row(challenge("xor", Category::Crypto, 50, "f1"))
        .unwrap();
    s.upsert_challenge_row(challenge("rsa", Category::Crypto, 150, "f2"))
        .unwrap();
    s.upsert_challenge_row(challenge("sqli", Category::Web, 100, "f3"))
        .unwrap();

    let crypto = s.find_challenge_rows_by_category(Category::Crypto).unwrap();
    let names: Vec<&str> = crypto.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["rsa", "xor"]);
    assert!(s
        .find_challenge_rows_by_category(Category::Forensics)
        .unwrap()
        .is_empty());
}

#[test]
fn at_catalog_db_03_delete_reports_presence() {
    let mut s = FlagdeskStore::new_in_memory();
    s.upsert_challenge_row(challenge("xor", Category::Crypto, 50, "f1"))
        .unwrap();
    assert!(s.delete_challenge_row(&name("xor")).unwrap());
    assert!(!s.delete_challenge_row(&name("xor")).unwrap());
    assert!(s.find_challenge_row(&name("xor")).unwrap().is_none());
}

#[test]
fn at_catalog_db_04_admin_upsert_is_idempotent() {
    let mut s = FlagdeskStore::new_in_memory();
    let alice = DisplayName::new("alice").unwrap();
    assert_eq!(
        s.upsert_admin_row(alice.clone(), TimestampMs(10)).unwrap(),
        UpsertOutcome::Inserted
    );
    assert_eq!(
        s.upsert_admin_row(alice.clone(), TimestampMs(20)).unwrap(),
        UpsertOutcome::Replaced
    );
    let row = s.find_admin_row(&alice).unwrap().unwrap();
    assert_eq!(row.granted_at, TimestampMs(10));
    assert!(s
        .find_admin_row(&DisplayName::new("Alice").unwrap())
        .unwrap()
        .is_none());
}
