#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use flagdesk_engines::pagination::{capture_snapshot, render_page};
use flagdesk_engines::ranking::{
    compute_leaderboard, compute_solver_directory, distinct_solver_counts,
};
use flagdesk_engines::workflow::{
    current_prompt, FlowInput, FlowPrompt, WorkflowEffect, WorkflowRuntime, WorkflowStep,
};
use flagdesk_kernel_contracts::catalog::{Category, ChallengeName};
use flagdesk_kernel_contracts::event::{
    Command, DeliveryMode, InboundEvent, InboundPayload, OutboundResponse, PageTurn,
    ResponseOption, ResponseStatus, Selection,
};
use flagdesk_kernel_contracts::identity::{DisplayName, UserId};
use flagdesk_kernel_contracts::session::{ChallengeDraft, FlowKind, ListKind, UserSession};
use flagdesk_kernel_contracts::{TimestampMs, Validate};
use flagdesk_storage::repo::FlagdeskRepo;
use flagdesk_storage::StorageError;
use tracing::{debug, error, info, warn};

use crate::authz::AuthorizationGuard;
use crate::config::OsConfig;
use crate::ledger::{LedgerError, ScoringLedger};
use crate::render;
use crate::retry::StoreCallError;
use crate::session::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Challenge(String),
    /// No active flow to receive a selection or free text.
    Flow,
    /// Cached list absent, replaced, or paged past its end.
    Snapshot(ListKind),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("unauthorized: /{command}")]
    Unauthorized { command: &'static str },
    #[error("not found: {0:?}")]
    NotFound(Missing),
    #[error("validation failure: {reason}")]
    ValidationFailure { reason: String },
    #[error("store unavailable after {attempts} attempts")]
    TransientTransportFailure { attempts: u32 },
    #[error("cascading delete of {challenge} interrupted at {stage}")]
    PartialCascadeFailure {
        challenge: String,
        stage: &'static str,
    },
    #[error("internal: {detail}")]
    Internal { detail: String },
}

impl From<StoreCallError> for DispatchError {
    fn from(e: StoreCallError) -> Self {
        match e {
            StoreCallError::Exhausted { attempts, .. } => {
                DispatchError::TransientTransportFailure { attempts }
            }
            StoreCallError::Rejected(StorageError::ContractViolation(v)) => {
                DispatchError::ValidationFailure {
                    reason: v.to_string(),
                }
            }
            StoreCallError::Rejected(e) => DispatchError::Internal {
                detail: e.to_string(),
            },
        }
    }
}

impl From<LedgerError> for DispatchError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::ChallengeNotFound { challenge } => {
                DispatchError::NotFound(Missing::Challenge(challenge))
            }
            LedgerError::PartialCascade {
                challenge, stage, ..
            } => DispatchError::PartialCascadeFailure {
                challenge,
                stage: stage.as_str(),
            },
            LedgerError::Store(e) => e.into(),
            LedgerError::Contract(v) => DispatchError::ValidationFailure {
                reason: v.to_string(),
            },
        }
    }
}

impl DispatchError {
    /// Short user-facing rendering. Internal detail stays in the logs.
    pub fn to_response(&self) -> OutboundResponse {
        match self {
            DispatchError::Unauthorized { .. } => {
                OutboundResponse::message(ResponseStatus::Unauthorized, "Unauthorized.")
            }
            DispatchError::NotFound(Missing::Challenge(name)) => OutboundResponse::message(
                ResponseStatus::NotFound,
                format!("Challenge '{name}' does not exist."),
            ),
            DispatchError::NotFound(Missing::Flow) => OutboundResponse::message(
                ResponseStatus::NotFound,
                "No operation in progress. Start one with /submit or /addflag.",
            ),
            DispatchError::NotFound(Missing::Snapshot(_)) => OutboundResponse::edit(
                ResponseStatus::Expired,
                "Data expired, re-run the listing command.",
            ),
            DispatchError::ValidationFailure { reason } => {
                OutboundResponse::message(ResponseStatus::ValidationFailure, reason.clone())
            }
            DispatchError::TransientTransportFailure { .. } | DispatchError::Internal { .. } => {
                OutboundResponse::message(
                    ResponseStatus::Failed,
                    "Something went wrong. Please try again.",
                )
            }
            DispatchError::PartialCascadeFailure { challenge, .. } => OutboundResponse::message(
                ResponseStatus::Failed,
                format!(
                    "Deleting '{challenge}' was interrupted. Run /delete {challenge} again to finish it."
                ),
            ),
        }
    }
}

fn usage(text: &str) -> DispatchError {
    DispatchError::ValidationFailure {
        reason: format!("Usage: {text}"),
    }
}

struct Caller<'a> {
    user_id: UserId,
    display_name: Option<&'a DisplayName>,
    now: TimestampMs,
}

impl Caller<'_> {
    fn handle(&self) -> &str {
        self.display_name
            .map(DisplayName::as_str)
            .unwrap_or(render::UNKNOWN_NAME)
    }
}

/// Routes one inbound event to a stateless handler, the workflow engine, or the
/// pagination cache, and always answers with a renderable response.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    config: OsConfig,
    guard: AuthorizationGuard,
    ledger: ScoringLedger,
    workflow: WorkflowRuntime,
}

impl CommandDispatcher {
    pub fn new(config: OsConfig) -> Self {
        Self {
            guard: AuthorizationGuard::new(config.root.clone()),
            ledger: ScoringLedger::new(config.retry),
            workflow: WorkflowRuntime::new(config.workflow),
            config,
        }
    }

    pub fn ledger(&self) -> &ScoringLedger {
        &self.ledger
    }

    pub fn handle<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &mut S,
        sessions: &SessionStore,
        event: &InboundEvent,
    ) -> OutboundResponse {
        match self.dispatch(store, sessions, event) {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    DispatchError::Internal { detail } => {
                        error!(user_id = %event.user_id, detail = %detail, "dispatch failed")
                    }
                    DispatchError::TransientTransportFailure { attempts } => {
                        warn!(user_id = %event.user_id, attempts, "store unavailable, giving up")
                    }
                    other => debug!(user_id = %event.user_id, error = %other, "dispatch refused"),
                }
                e.to_response()
            }
        }
    }

    fn dispatch<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &mut S,
        sessions: &SessionStore,
        event: &InboundEvent,
    ) -> Result<OutboundResponse, DispatchError> {
        if let Err(v) = event.validate() {
            // Keep an active flow on its step and repeat what it is waiting for.
            let flow = sessions.load(event.user_id).flow;
            return match current_prompt(&flow) {
                Some(prompt) => Ok(corrective(
                    &prompt,
                    "That input could not be accepted.",
                    DeliveryMode::NewMessage,
                )),
                None => Err(DispatchError::ValidationFailure {
                    reason: v.to_string(),
                }),
            };
        }
        self.config.retry.run("upsert_user_on_first_contact", || {
            store.upsert_user_row_on_first_contact(
                event.user_id,
                event.display_name.clone(),
                event.received_at,
            )
        })?;

        let caller = Caller {
            user_id: event.user_id,
            display_name: event.display_name.as_ref(),
            now: event.received_at,
        };
        match &event.payload {
            InboundPayload::Command { command } => self.on_command(store, sessions, &caller, command),
            InboundPayload::Selection { selection } => {
                self.on_selection(store, sessions, &caller, selection)
            }
            InboundPayload::FreeText { text } => {
                let session = sessions.load(caller.user_id);
                let step = self.workflow.advance(session.flow.clone(), FlowInput::Text(text));
                self.apply_step(store, sessions, &caller, session, step, DeliveryMode::NewMessage)
            }
            InboundPayload::PageTurn { page_turn } => self.on_page_turn(sessions, &caller, page_turn),
        }
    }

    fn is_privileged<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &S,
        caller: &Caller<'_>,
    ) -> Result<bool, DispatchError> {
        Ok(self.config.retry.run("find_admin", || {
            self.guard
                .is_privileged(store, caller.user_id, caller.display_name)
        })?)
    }

    fn require_privileged<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &S,
        caller: &Caller<'_>,
        command: &'static str,
    ) -> Result<(), DispatchError> {
        if self.is_privileged(store, caller)? {
            return Ok(());
        }
        warn!(user_id = %caller.user_id, command, "privileged command refused");
        Err(DispatchError::Unauthorized { command })
    }

    fn on_command<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &mut S,
        sessions: &SessionStore,
        caller: &Caller<'_>,
        command: &Command,
    ) -> Result<OutboundResponse, DispatchError> {
        if command.is_privileged() {
            self.require_privileged(store, caller, command.name())?;
        }
        let retry = &self.config.retry;

        match command {
            Command::Start => Ok(OutboundResponse::message(
                ResponseStatus::Ok,
                format!(
                    "Welcome, @{}! You are registered.\n\n{}",
                    caller.handle(),
                    render::help_text(false)
                ),
            )),
            Command::Help => {
                let privileged = self.is_privileged(store, caller)?;
                Ok(OutboundResponse::message(
                    ResponseStatus::Ok,
                    render::help_text(privileged),
                ))
            }
            Command::Submit => {
                let solved: BTreeSet<ChallengeName> = retry
                    .run("find_submissions_by_user", || {
                        store.find_submission_rows_by_user(&caller.user_id, true)
                    })?
                    .into_iter()
                    .map(|s| s.challenge)
                    .collect();
                let unsolved: Vec<ChallengeName> = retry
                    .run("list_challenges", || store.challenge_rows())?
                    .into_iter()
                    .map(|c| c.name)
                    .filter(|n| !solved.contains(n))
                    .collect();
                let session = sessions.load(caller.user_id);
                let step = self.workflow.start_submission(unsolved);
                self.apply_step(store, sessions, caller, session, step, DeliveryMode::NewMessage)
            }
            Command::MyPoints => {
                let points = retry
                    .run("find_user", || store.find_user_row(&caller.user_id))?
                    .map(|u| u.points)
                    .unwrap_or(0);
                Ok(OutboundResponse::message(
                    ResponseStatus::Ok,
                    format!("@{}, you have {points} points.", caller.handle()),
                ))
            }
            Command::ViewChallenges => Ok(OutboundResponse::message(
                ResponseStatus::Ok,
                "Select a category:",
            )
            .with_options(render::category_options(Selection::BrowseCategory))),
            Command::Leaderboard => {
                let users = retry.run("list_users", || store.user_rows())?;
                let submissions = retry.run("list_submissions", || store.submission_rows())?;
                let lines = render::leaderboard_lines(&compute_leaderboard(&users, &submissions));
                self.publish_list(
                    sessions,
                    caller,
                    ListKind::Leaderboard,
                    render::leaderboard_title(),
                    lines,
                    "No users on the leaderboard yet.",
                )
            }
            Command::Bloods { challenge } => {
                let raw = challenge.as_deref().ok_or_else(|| usage("/bloods <challenge>"))?;
                let name = parse_challenge_name(raw)?;
                self.solver_directory(store, sessions, caller, &name)
            }
            Command::AddFlag => {
                let session = sessions.load(caller.user_id);
                let step = self.workflow.start_entry_creation();
                self.apply_step(store, sessions, caller, session, step, DeliveryMode::NewMessage)
            }
            Command::AddAdmin { username } => {
                let raw = username
                    .as_deref()
                    .ok_or_else(|| usage("/addnewadmins <username>"))?;
                let name = DisplayName::parse_handle(raw).map_err(|v| {
                    DispatchError::ValidationFailure {
                        reason: v.to_string(),
                    }
                })?;
                retry.run("upsert_admin", || {
                    store.upsert_admin_row(name.clone(), caller.now)
                })?;
                info!(granted_by = %caller.user_id, admin = %name, "admin granted");
                Ok(OutboundResponse::message(
                    ResponseStatus::Ok,
                    format!("@{name} is now an admin."),
                ))
            }
            Command::Delete { challenge } => {
                let raw = challenge.as_deref().ok_or_else(|| usage("/delete <challenge>"))?;
                let name = parse_challenge_name(raw)?;
                let report = self.ledger.reverse_challenge(store, &name, caller.now)?;
                let mut text = format!("Challenge '{name}' and all related data deleted.");
                text.push_str(&format!(
                    "\nReversed {} points for {} users, removed {} submissions.",
                    report.points, report.users_reversed, report.submissions_deleted
                ));
                if report.resumed {
                    text.push_str("\nAn earlier interrupted deletion was completed.");
                }
                Ok(OutboundResponse::message(ResponseStatus::Ok, text))
            }
            Command::ViewUsers => {
                let users = retry.run("list_users", || store.user_rows())?;
                self.publish_list(
                    sessions,
                    caller,
                    ListKind::RegisteredUsers,
                    "Registered Users".to_string(),
                    render::registered_user_lines(&users),
                    "No registered users yet.",
                )
            }
            Command::ViewSubmissions => {
                let users = retry.run("list_users", || store.user_rows())?;
                let submissions = retry.run("list_submissions", || store.submission_rows())?;
                self.publish_list(
                    sessions,
                    caller,
                    ListKind::SubmissionAudit,
                    "Submissions".to_string(),
                    render::audit_lines(&submissions, &users),
                    "No submissions yet.",
                )
            }
            Command::Reconcile { repair } => {
                let report = self.ledger.reconcile_points(store, *repair)?;
                info!(
                    requested_by = %caller.user_id,
                    drifts = report.drifts.len(),
                    repaired = report.repaired,
                    "points reconciliation run"
                );
                Ok(OutboundResponse::message(
                    ResponseStatus::Ok,
                    render::reconcile_text(&report.drifts, report.repaired),
                ))
            }
            Command::Cancel => {
                let session = sessions.load(caller.user_id);
                let step = self.workflow.advance(session.flow.clone(), FlowInput::Cancel);
                self.apply_step(store, sessions, caller, session, step, DeliveryMode::NewMessage)
            }
        }
    }

    fn on_selection<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &mut S,
        sessions: &SessionStore,
        caller: &Caller<'_>,
        selection: &Selection,
    ) -> Result<OutboundResponse, DispatchError> {
        let retry = &self.config.retry;
        match selection {
            Selection::BrowseCategory(category) => self.browse_category(store, *category),
            Selection::ChallengeDetail(name) => {
                let record = retry
                    .run("find_challenge", || store.find_challenge_row(name))?
                    .ok_or_else(|| DispatchError::NotFound(Missing::Challenge(name.to_string())))?;
                Ok(
                    OutboundResponse::edit(ResponseStatus::Ok, render::challenge_detail_text(&record))
                        .with_options(vec![ResponseOption::select(
                            "View solvers",
                            Selection::SolverDirectory(name.clone()),
                        )]),
                )
            }
            Selection::SolverDirectory(name) => self.solver_directory(store, sessions, caller, name),
            Selection::SubmitChallenge(_) | Selection::FlowCategory(_) | Selection::FlowLevel(_) => {
                let session = sessions.load(caller.user_id);
                let step = self
                    .workflow
                    .advance(session.flow.clone(), FlowInput::Select(selection));
                self.apply_step(store, sessions, caller, session, step, DeliveryMode::EditPrevious)
            }
        }
    }

    fn browse_category<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &S,
        category: Category,
    ) -> Result<OutboundResponse, DispatchError> {
        let retry = &self.config.retry;
        let challenges = retry.run("find_challenges_by_category", || {
            store.find_challenge_rows_by_category(category)
        })?;
        if challenges.is_empty() {
            return Ok(OutboundResponse::edit(
                ResponseStatus::Ok,
                format!("No challenges in category {}.", category.as_str()),
            ));
        }
        let counts = distinct_solver_counts(&retry.run("list_submissions", || store.submission_rows())?);
        Ok(OutboundResponse::edit(
            ResponseStatus::Ok,
            format!("Challenges in {}:", category.as_str()),
        )
        .with_options(render::challenge_list_options(&challenges, &counts)))
    }

    fn solver_directory<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &S,
        sessions: &SessionStore,
        caller: &Caller<'_>,
        name: &ChallengeName,
    ) -> Result<OutboundResponse, DispatchError> {
        let retry = &self.config.retry;
        if retry
            .run("find_challenge", || store.find_challenge_row(name))?
            .is_none()
        {
            return Err(DispatchError::NotFound(Missing::Challenge(name.to_string())));
        }
        let correct = retry.run("find_submissions_by_challenge", || {
            store.find_submission_rows_by_challenge(name, true)
        })?;
        let users = retry.run("list_users", || store.user_rows())?;
        let directory = compute_solver_directory(name, &correct);
        self.publish_list(
            sessions,
            caller,
            ListKind::Solvers,
            render::solvers_title(name),
            render::solver_lines(&directory, &users),
            &format!("No solves for {name} yet."),
        )
    }

    /// Caches the full list in the caller's session and renders its first page. Empty lists
    /// are answered directly and never cached.
    fn publish_list(
        &self,
        sessions: &SessionStore,
        caller: &Caller<'_>,
        kind: ListKind,
        title: String,
        lines: Vec<String>,
        empty_text: &str,
    ) -> Result<OutboundResponse, DispatchError> {
        if lines.is_empty() {
            return Ok(OutboundResponse::message(ResponseStatus::Ok, empty_text));
        }
        let snapshot = capture_snapshot(kind, title, lines, caller.now);
        let page_size = self.config.pagination.page_size_for(kind);
        let response = match render_page(&snapshot, 0, page_size) {
            Ok(page) => render::page_response(&snapshot, &page, DeliveryMode::NewMessage),
            Err(e) => {
                return Err(DispatchError::Internal {
                    detail: e.to_string(),
                })
            }
        };
        let mut session = sessions.load(caller.user_id);
        session.put_snapshot(snapshot);
        sessions.save(caller.user_id, session);
        Ok(response)
    }

    fn on_page_turn(
        &self,
        sessions: &SessionStore,
        caller: &Caller<'_>,
        turn: &PageTurn,
    ) -> Result<OutboundResponse, DispatchError> {
        let expired = || DispatchError::NotFound(Missing::Snapshot(turn.list));
        let session = sessions.load(caller.user_id);
        let snapshot = session
            .snapshot(turn.list)
            .filter(|s| s.snapshot_id == turn.snapshot_id)
            .ok_or_else(expired)?;
        let page_size = self.config.pagination.page_size_for(turn.list);
        let page = render_page(snapshot, turn.page, page_size).map_err(|_| expired())?;
        Ok(render::page_response(snapshot, &page, DeliveryMode::EditPrevious))
    }

    /// Executes a workflow transition. Terminal store effects run before the new flow state is
    /// saved, so a failed write leaves the caller on the step they were at.
    fn apply_step<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &mut S,
        sessions: &SessionStore,
        caller: &Caller<'_>,
        mut session: UserSession,
        step: WorkflowStep,
        delivery: DeliveryMode,
    ) -> Result<OutboundResponse, DispatchError> {
        let WorkflowStep { next, effect } = step;
        let save = |mut session: UserSession| {
            session.flow = next.clone();
            sessions.save(caller.user_id, session);
        };

        match effect {
            WorkflowEffect::Prompt(prompt) => {
                save(session);
                Ok(render::prompt_response(&prompt, delivery))
            }
            WorkflowEffect::Reprompt { prompt, reason } => {
                save(session);
                Ok(corrective(&prompt, &render::reprompt_text(reason), delivery))
            }
            WorkflowEffect::NotAccepted { prompt } => {
                save(session);
                Ok(corrective(&prompt, "That input is not expected at this step.", delivery))
            }
            WorkflowEffect::NothingLeft => {
                save(session);
                Ok(OutboundResponse::message(
                    ResponseStatus::Ok,
                    "All challenges solved!",
                ))
            }
            WorkflowEffect::RecordAttempt { challenge, token } => {
                match self
                    .ledger
                    .record_attempt(store, caller.user_id, &challenge, &token, caller.now)
                {
                    Ok(outcome) => {
                        save(session);
                        let text = if outcome.correct && outcome.points_awarded > 0 {
                            format!(
                                "Correct! You earned {} points for {challenge}!",
                                outcome.points_awarded
                            )
                        } else if outcome.correct {
                            format!("Correct! You already scored {challenge}, no extra points.")
                        } else {
                            format!("Incorrect for {challenge}. Try again with /submit")
                        };
                        Ok(OutboundResponse::message(ResponseStatus::Ok, text))
                    }
                    Err(LedgerError::ChallengeNotFound { challenge }) => {
                        save(session);
                        Err(DispatchError::NotFound(Missing::Challenge(challenge)))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            WorkflowEffect::UpsertChallenge(draft) => {
                // Privilege is tied to a mutable display name, so check again at commit.
                self.require_privileged(store, caller, Command::AddFlag.name())?;
                let text = self.commit_draft(store, draft)?;
                save(session);
                Ok(OutboundResponse::message(ResponseStatus::Ok, text))
            }
            WorkflowEffect::Cancelled { flow } => {
                session.reset_flow();
                save(session);
                let text = match flow {
                    Some(FlowKind::Submission) | Some(FlowKind::EntryCreation) => {
                        "Operation cancelled."
                    }
                    None => "Nothing to cancel.",
                };
                Ok(OutboundResponse::message(ResponseStatus::Ok, text))
            }
            WorkflowEffect::NoActiveFlow => Err(DispatchError::NotFound(Missing::Flow)),
        }
    }

    fn commit_draft<S: FlagdeskRepo + ?Sized>(
        &self,
        store: &mut S,
        draft: ChallengeDraft,
    ) -> Result<String, DispatchError> {
        let record = draft
            .into_record()
            .map_err(|v| DispatchError::ValidationFailure {
                reason: v.to_string(),
            })?;
        let text = format!(
            "Challenge '{}' in category '{}' with level '{}' added/updated with {} points.",
            record.name,
            record.category.as_str(),
            record.level.as_str(),
            record.points
        );
        let name = record.name.clone();
        match self
            .config
            .retry
            .run("upsert_challenge", || store.upsert_challenge_row(record.clone()))
        {
            Ok(outcome) => {
                info!(challenge = %name, ?outcome, "challenge upserted");
                Ok(text)
            }
            Err(StoreCallError::Rejected(StorageError::PendingDeletion { challenge })) => {
                Err(DispatchError::ValidationFailure {
                    reason: format!(
                        "Challenge '{challenge}' is being deleted. Run /delete {challenge} to finish it first."
                    ),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn corrective(prompt: &FlowPrompt, reason: &str, delivery: DeliveryMode) -> OutboundResponse {
    let mut response = render::prompt_response(prompt, delivery);
    response.status = ResponseStatus::ValidationFailure;
    response.text = format!("{reason}\n{}", response.text);
    response
}

fn parse_challenge_name(raw: &str) -> Result<ChallengeName, DispatchError> {
    ChallengeName::new(raw).map_err(|v| DispatchError::ValidationFailure {
        reason: v.to_string(),
    })
}
