#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use flagdesk_kernel_contracts::catalog::{ChallengeName, ChallengeRecord};
use flagdesk_kernel_contracts::identity::UserId;
use flagdesk_kernel_contracts::ledger::{SubmissionRecord, UserRecord};

/// Rebuilds point totals from the submission log: each (user, challenge) pair with at least one
/// correct submission contributes the challenge's current value once. Submissions against a
/// challenge that no longer exists contribute nothing.
pub fn project_points(
    challenges: &[ChallengeRecord],
    submissions: &[SubmissionRecord],
) -> BTreeMap<UserId, i64> {
    let values: BTreeMap<&ChallengeName, u32> =
        challenges.iter().map(|c| (&c.name, c.points)).collect();
    let solved: BTreeSet<(UserId, &ChallengeName)> = submissions
        .iter()
        .filter(|s| s.correct)
        .map(|s| (s.user_id, &s.challenge))
        .collect();

    let mut out = BTreeMap::new();
    for (user_id, challenge) in solved {
        if let Some(points) = values.get(challenge) {
            *out.entry(user_id).or_insert(0i64) += i64::from(*points);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsDrift {
    pub user_id: UserId,
    pub recorded: i64,
    pub projected: i64,
}

/// Users whose stored total disagrees with the projection, in user id order.
pub fn detect_drift(users: &[UserRecord], projected: &BTreeMap<UserId, i64>) -> Vec<PointsDrift> {
    let mut drifts: Vec<PointsDrift> = users
        .iter()
        .filter_map(|u| {
            let projected = projected.get(&u.user_id).copied().unwrap_or(0);
            (u.points != projected).then_some(PointsDrift {
                user_id: u.user_id,
                recorded: u.points,
                projected,
            })
        })
        .collect();
    drifts.sort_by_key(|d| d.user_id);
    drifts
}
