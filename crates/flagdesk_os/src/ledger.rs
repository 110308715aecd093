#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use flagdesk_engines::projection::{detect_drift, project_points, PointsDrift};
use flagdesk_kernel_contracts::catalog::ChallengeName;
use flagdesk_kernel_contracts::identity::UserId;
use flagdesk_kernel_contracts::ledger::{
    CascadeStage, PendingDeletionRecord, SubmissionId, SubmissionInput,
};
use flagdesk_kernel_contracts::{ContractViolation, TimestampMs};
use flagdesk_storage::repo::{CatalogRepo, FlagdeskRepo, LedgerRepo};
use flagdesk_storage::StorageError;
use tracing::{error, info, warn};

use crate::retry::{RetryPolicy, StoreCallError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("challenge {challenge} not found")]
    ChallengeNotFound { challenge: String },
    /// The cascade stopped part way. The pending-deletion marker is left in place.
    #[error("cascading delete of {challenge} interrupted at {}", .stage.as_str())]
    PartialCascade {
        challenge: String,
        stage: CascadeStage,
        cause: StoreCallError,
    },
    #[error(transparent)]
    Store(#[from] StoreCallError),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub submission_id: SubmissionId,
    pub correct: bool,
    /// Zero for wrong attempts and for repeat solves of an already-solved challenge.
    pub points_awarded: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalReport {
    pub challenge: ChallengeName,
    pub points: u32,
    pub users_reversed: u32,
    pub submissions_deleted: usize,
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub drifts: Vec<PointsDrift>,
    pub repaired: usize,
}

/// Owns every points mutation: the upward path on a first correct solve and the downward path
/// of a cascading delete.
#[derive(Debug, Clone)]
pub struct ScoringLedger {
    retry: RetryPolicy,
}

impl ScoringLedger {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn record_attempt<S: CatalogRepo + LedgerRepo + ?Sized>(
        &self,
        store: &mut S,
        user_id: UserId,
        challenge: &ChallengeName,
        token: &str,
        now: TimestampMs,
    ) -> Result<AttemptOutcome, LedgerError> {
        let Some(record) = self
            .retry
            .run("find_challenge", || store.find_challenge_row(challenge))?
        else {
            return Err(not_found(challenge));
        };

        let attempt = token.trim();
        let correct = record.token_matches(attempt);
        let input = SubmissionInput::v1(
            user_id,
            challenge.clone(),
            attempt.to_string(),
            correct,
            now,
        )?;

        let inserted = match self
            .retry
            .run("insert_submission", || store.insert_submission_row(input.clone()))
        {
            Ok(ok) => ok,
            // Deleted, or being deleted, between lookup and insert.
            Err(StoreCallError::Rejected(
                StorageError::PendingDeletion { .. }
                | StorageError::ForeignKeyViolation {
                    table: "submissions.challenge",
                    ..
                },
            )) => return Err(not_found(challenge)),
            Err(e) => return Err(e.into()),
        };

        // The insert credits points itself, so a failure here leaves neither the row nor
        // the points behind.
        let points_awarded = inserted.points_awarded;

        info!(
            user_id = %user_id,
            challenge = %challenge,
            submission_id = inserted.submission_id.0,
            correct,
            points_awarded,
            "attempt recorded"
        );
        Ok(AttemptOutcome {
            submission_id: inserted.submission_id,
            correct,
            points_awarded,
        })
    }

    /// Cascading delete: reverse each distinct solver once, drop the challenge's submissions,
    /// then drop the challenge. A marker is written first so an interrupted run can resume
    /// without reversing anyone twice. Calling this again for a challenge with a marker resumes it.
    pub fn reverse_challenge<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &mut S,
        challenge: &ChallengeName,
        now: TimestampMs,
    ) -> Result<ReversalReport, LedgerError> {
        if let Some(marker) = self.retry.run("find_pending_deletion", || {
            store.find_pending_deletion_row(challenge)
        })? {
            warn!(challenge = %challenge, stage = marker.stage.as_str(), "resuming pending deletion");
            return self.drive_cascade(store, marker, true);
        }

        if self
            .retry
            .run("find_challenge", || store.find_challenge_row(challenge))?
            .is_none()
        {
            return Err(not_found(challenge));
        }
        let solvers: BTreeSet<UserId> = self
            .retry
            .run("find_submissions_by_challenge", || {
                store.find_submission_rows_by_challenge(challenge, true)
            })?
            .into_iter()
            .map(|s| s.user_id)
            .collect();
        let marker = match self.retry.run("begin_pending_deletion", || {
            store.begin_pending_deletion_row(challenge, solvers.clone(), now)
        }) {
            Ok(m) => m,
            Err(StoreCallError::Rejected(StorageError::NotFound { .. })) => {
                return Err(not_found(challenge))
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            challenge = %challenge,
            points = marker.points,
            solvers = marker.remaining_reversals.len(),
            "cascading delete started"
        );
        self.drive_cascade(store, marker, false)
    }

    /// Completes every cascade left behind by an earlier interruption.
    pub fn resume_pending_deletions<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &mut S,
    ) -> Result<Vec<ReversalReport>, LedgerError> {
        let markers = self
            .retry
            .run("list_pending_deletions", || store.pending_deletion_rows())?;
        let mut reports = Vec::with_capacity(markers.len());
        for marker in markers {
            warn!(
                challenge = %marker.challenge,
                stage = marker.stage.as_str(),
                remaining = marker.remaining_reversals.len(),
                "resuming pending deletion"
            );
            reports.push(self.drive_cascade(store, marker, true)?);
        }
        Ok(reports)
    }

    fn drive_cascade<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &mut S,
        marker: PendingDeletionRecord,
        resumed: bool,
    ) -> Result<ReversalReport, LedgerError> {
        let challenge = marker.challenge.clone();
        let mut users_reversed = marker.reversed_count;

        for user_id in &marker.remaining_reversals {
            match self.retry.run("apply_pending_reversal", || {
                store.apply_pending_reversal_row(&challenge, user_id)
            }) {
                Ok(true) => users_reversed = users_reversed.saturating_add(1),
                Ok(false) => {}
                Err(e) => return Err(partial(&challenge, CascadeStage::ReversingPoints, e)),
            }
        }

        let submissions_deleted = self
            .retry
            .run("advance_pending_deletion", || {
                store.advance_pending_deletion_row(&challenge, CascadeStage::DeletingSubmissions)
            })
            .and_then(|()| {
                self.retry.run("delete_submissions_by_challenge", || {
                    store.delete_submission_rows_by_challenge(&challenge)
                })
            })
            .map_err(|e| partial(&challenge, CascadeStage::DeletingSubmissions, e))?;

        self.retry
            .run("advance_pending_deletion", || {
                store.advance_pending_deletion_row(&challenge, CascadeStage::DeletingChallenge)
            })
            .and_then(|()| {
                self.retry
                    .run("delete_challenge", || store.delete_challenge_row(&challenge))
            })
            .and_then(|_| {
                self.retry.run("complete_pending_deletion", || {
                    store.complete_pending_deletion_row(&challenge)
                })
            })
            .map_err(|e| partial(&challenge, CascadeStage::DeletingChallenge, e))?;

        info!(
            challenge = %challenge,
            users_reversed,
            submissions_deleted,
            resumed,
            "cascading delete completed"
        );
        Ok(ReversalReport {
            challenge,
            points: marker.points,
            users_reversed,
            submissions_deleted,
            resumed,
        })
    }

    /// Recomputes every user's total from the submission log. With `repair`, drifted totals
    /// are overwritten with the projection.
    pub fn reconcile_points<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &mut S,
        repair: bool,
    ) -> Result<ReconcileReport, LedgerError> {
        let pending = self
            .retry
            .run("list_pending_deletions", || store.pending_deletion_rows())?;
        if !pending.is_empty() {
            warn!(
                pending = pending.len(),
                "reconciling with unfinished cascades; resume them first for exact totals"
            );
        }
        let challenges = self.retry.run("list_challenges", || store.challenge_rows())?;
        let submissions = self.retry.run("list_submissions", || store.submission_rows())?;
        let users = self.retry.run("list_users", || store.user_rows())?;

        let projected = project_points(&challenges, &submissions);
        let drifts = detect_drift(&users, &projected);
        let mut repaired = 0;
        if repair {
            for d in &drifts {
                self.retry
                    .run("set_points", || store.set_points_row(&d.user_id, d.projected))?;
                repaired += 1;
            }
        }
        if !drifts.is_empty() {
            warn!(drifts = drifts.len(), repaired, "points drift detected");
        }
        Ok(ReconcileReport { drifts, repaired })
    }
}

fn not_found(challenge: &ChallengeName) -> LedgerError {
    LedgerError::ChallengeNotFound {
        challenge: challenge.as_str().to_string(),
    }
}

fn partial(challenge: &ChallengeName, stage: CascadeStage, cause: StoreCallError) -> LedgerError {
    error!(
        challenge = %challenge,
        stage = stage.as_str(),
        error = %cause,
        "cascading delete interrupted; pending deletion marker retained"
    );
    LedgerError::PartialCascade {
        challenge: challenge.as_str().to_string(),
        stage,
        cause,
    }
}
