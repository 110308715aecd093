#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use flagdesk_kernel_contracts::catalog::ChallengeName;
use flagdesk_kernel_contracts::identity::{DisplayName, UserId};
use flagdesk_kernel_contracts::ledger::{SubmissionId, SubmissionRecord, UserRecord};
use flagdesk_kernel_contracts::TimestampMs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: UserId,
    pub display_name: Option<DisplayName>,
    pub points: i64,
    pub first_scored_at: Option<TimestampMs>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverEntry {
    pub position: u32,
    pub user_id: UserId,
    pub first_solved_at: TimestampMs,
    pub first_blood: bool,
}

/// Earliest correct submission per user, across all challenges.
pub fn first_correct_by_user(
    submissions: &[SubmissionRecord],
) -> BTreeMap<UserId, (TimestampMs, SubmissionId)> {
    let mut out: BTreeMap<UserId, (TimestampMs, SubmissionId)> = BTreeMap::new();
    for s in submissions.iter().filter(|s| s.correct) {
        let key = s.chronological_key();
        out.entry(s.user_id)
            .and_modify(|cur| {
                if key < *cur {
                    *cur = key;
                }
            })
            .or_insert(key);
    }
    out
}

// Absent first-blood sorts after every present one.
fn cmp_first_scored(
    a: Option<(TimestampMs, SubmissionId)>,
    b: Option<(TimestampMs, SubmissionId)>,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Points descending, then earliest first correct submission, then user id.
/// Recomputed from scratch on every call.
pub fn compute_leaderboard(
    users: &[UserRecord],
    submissions: &[SubmissionRecord],
) -> Vec<LeaderboardEntry> {
    let first = first_correct_by_user(submissions);
    let mut rows: Vec<(&UserRecord, Option<(TimestampMs, SubmissionId)>)> = users
        .iter()
        .map(|u| (u, first.get(&u.user_id).copied()))
        .collect();
    rows.sort_by(|(ua, fa), (ub, fb)| {
        ub.points
            .cmp(&ua.points)
            .then_with(|| cmp_first_scored(*fa, *fb))
            .then_with(|| ua.user_id.cmp(&ub.user_id))
    });
    rows.into_iter()
        .enumerate()
        .map(|(i, (u, f))| LeaderboardEntry {
            rank: u32::try_from(i + 1).unwrap_or(u32::MAX),
            user_id: u.user_id,
            display_name: u.display_name.clone(),
            points: u.points,
            first_scored_at: f.map(|(at, _)| at),
        })
        .collect()
}

/// Distinct solvers of one challenge in order of their earliest correct submission.
/// Repeated correct submissions collapse to the earliest; only the first entry is first blood.
pub fn compute_solver_directory(
    challenge: &ChallengeName,
    submissions: &[SubmissionRecord],
) -> Vec<SolverEntry> {
    let mut earliest: BTreeMap<UserId, (TimestampMs, SubmissionId)> = BTreeMap::new();
    for s in submissions
        .iter()
        .filter(|s| s.correct && s.challenge == *challenge)
    {
        let key = s.chronological_key();
        earliest
            .entry(s.user_id)
            .and_modify(|cur| {
                if key < *cur {
                    *cur = key;
                }
            })
            .or_insert(key);
    }
    let mut ordered: Vec<(UserId, (TimestampMs, SubmissionId))> = earliest.into_iter().collect();
    ordered.sort_by(|(ua, ka), (ub, kb)| ka.cmp(kb).then_with(|| ua.cmp(ub)));
    ordered
        .into_iter()
        .enumerate()
        .map(|(i, (user_id, (at, _)))| SolverEntry {
            position: u32::try_from(i + 1).unwrap_or(u32::MAX),
            user_id,
            first_solved_at: at,
            first_blood: i == 0,
        })
        .collect()
}

/// Distinct-solver badge counts for catalog browsing.
pub fn distinct_solver_counts(submissions: &[SubmissionRecord]) -> BTreeMap<ChallengeName, u32> {
    let mut solvers: BTreeMap<&ChallengeName, BTreeSet<UserId>> = BTreeMap::new();
    for s in submissions.iter().filter(|s| s.correct) {
        solvers.entry(&s.challenge).or_default().insert(s.user_id);
    }
    solvers
        .into_iter()
        .map(|(name, set)| {
            (
                name.clone(),
                u32::try_from(set.len()).unwrap_or(u32::MAX),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagdesk_kernel_contracts::ledger::SubmissionInput;

    fn uid(id: i64) -> UserId {
        UserId::new(id).unwrap()
    }

    fn user(id: i64, points: i64) -> UserRecord {
        let mut u = UserRecord::first_contact_v1(
            uid(id),
            Some(DisplayName::new(format!("u{id}")).unwrap()),
            TimestampMs(0),
        );
        u.points = points;
        u
    }

    fn sub(seq: u64, user_id: i64, challenge: &str, correct: bool, at: u64) -> SubmissionRecord {
        SubmissionRecord::from_input_v1(
            SubmissionId(seq),
            SubmissionInput::v1(
                uid(user_id),
                ChallengeName::new(challenge).unwrap(),
                "t".to_string(),
                correct,
                TimestampMs(at),
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn at_rank_01_equal_points_earlier_first_blood_wins() {
        let users = vec![user(1, 100), user(2, 100)];
        let subs = vec![sub(1, 2, "a", true, 50), sub(2, 1, "b", true, 10)];
        let board = compute_leaderboard(&users, &subs);
        assert_eq!(board[0].user_id, uid(1));
        assert_eq!(board[1].user_id, uid(2));
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].first_scored_at, Some(TimestampMs(10)));
    }

    #[test]
    fn at_rank_02_never_scored_sorts_last_among_peers() {
        let users = vec![user(1, 0), user(2, 0), user(3, 50)];
        let subs = vec![sub(1, 2, "a", true, 99), sub(2, 1, "a", false, 1)];
        let board = compute_leaderboard(&users, &subs);
        let order: Vec<i64> = board.iter().map(|e| e.user_id.get()).collect();
        assert_eq!(order, vec![3, 2, 1]);
        assert_eq!(board[2].first_scored_at, None);
    }

    #[test]
    fn at_rank_03_ordering_is_stable_and_reacts_to_new_points() {
        let mut users = vec![user(1, 100), user(2, 50), user(3, 50)];
        let subs = vec![sub(1, 1, "a", true, 1)];
        let a = compute_leaderboard(&users, &subs);
        let b = compute_leaderboard(&users, &subs);
        assert_eq!(a, b);

        users[2].points = 150;
        let c = compute_leaderboard(&users, &subs);
        assert_eq!(c[0].user_id, uid(3));
    }

    #[test]
    fn at_rank_04_bloods_collapse_duplicates() {
        let name = ChallengeName::new("X").unwrap();
        let subs = vec![
            sub(1, 10, "X", true, 1),
            sub(2, 20, "X", true, 2),
            sub(3, 10, "X", true, 3),
            sub(4, 30, "X", false, 0),
            sub(5, 40, "Y", true, 0),
        ];
        let dir = compute_solver_directory(&name, &subs);
        assert_eq!(dir.len(), 2);
        assert_eq!(dir[0].user_id, uid(10));
        assert!(dir[0].first_blood);
        assert_eq!(dir[1].user_id, uid(20));
        assert!(!dir[1].first_blood);

        let counts = distinct_solver_counts(&subs);
        assert_eq!(counts.get(&name), Some(&2));
        assert_eq!(counts.get(&ChallengeName::new("Y").unwrap()), Some(&1));
    }

    #[test]
    fn at_rank_05_equal_timestamps_fall_back_to_insertion_order() {
        let name = ChallengeName::new("X").unwrap();
        let subs = vec![sub(7, 2, "X", true, 5), sub(3, 1, "X", true, 5)];
        let dir = compute_solver_directory(&name, &subs);
        assert_eq!(dir[0].user_id, uid(1));
    }
}
