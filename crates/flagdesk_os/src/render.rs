#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use flagdesk_engines::pagination::RenderedPage;
use flagdesk_engines::projection::PointsDrift;
use flagdesk_engines::ranking::{LeaderboardEntry, SolverEntry};
use flagdesk_engines::workflow::{FlowPrompt, RepromptReason};
use flagdesk_kernel_contracts::catalog::{Category, ChallengeName, ChallengeRecord, DifficultyLevel};
use flagdesk_kernel_contracts::event::{
    Command, DeliveryMode, OutboundResponse, PageTurn, ResponseOption, ResponseStatus, Selection,
};
use flagdesk_kernel_contracts::identity::UserId;
use flagdesk_kernel_contracts::ledger::{SubmissionRecord, UserRecord};
use flagdesk_kernel_contracts::session::ListSnapshot;
use flagdesk_kernel_contracts::TimestampMs;

pub const UNKNOWN_NAME: &str = "Unknown";

pub const AUDIT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// UTC wall-clock rendering used by the audit log.
pub fn audit_timestamp(at: TimestampMs) -> String {
    i64::try_from(at.as_millis())
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format(AUDIT_TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| at.as_millis().to_string())
}

fn name_of<'a>(names: &'a BTreeMap<UserId, &UserRecord>, user_id: &UserId) -> &'a str {
    names
        .get(user_id)
        .map(|u| u.display_name_or_unknown())
        .unwrap_or(UNKNOWN_NAME)
}

pub fn name_index(users: &[UserRecord]) -> BTreeMap<UserId, &UserRecord> {
    users.iter().map(|u| (u.user_id, u)).collect()
}

pub fn leaderboard_lines(entries: &[LeaderboardEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| {
            let name = e
                .display_name
                .as_ref()
                .map(|n| n.as_str())
                .unwrap_or(UNKNOWN_NAME);
            format!("{}. @{} - {} pts", e.rank, name, e.points)
        })
        .collect()
}

pub fn registered_user_lines(users: &[UserRecord]) -> Vec<String> {
    users
        .iter()
        .map(|u| format!("{}: @{}", u.user_id, u.display_name_or_unknown()))
        .collect()
}

/// Newest first.
pub fn audit_lines(submissions: &[SubmissionRecord], users: &[UserRecord]) -> Vec<String> {
    let names = name_index(users);
    let mut ordered: Vec<&SubmissionRecord> = submissions.iter().collect();
    ordered.sort_by(|a, b| b.chronological_key().cmp(&a.chronological_key()));
    ordered
        .into_iter()
        .map(|s| {
            format!(
                "{} - @{} - {} - {} - {}",
                audit_timestamp(s.submitted_at),
                name_of(&names, &s.user_id),
                s.challenge,
                s.submitted_token,
                if s.correct { "Correct" } else { "Wrong" }
            )
        })
        .collect()
}

pub fn solver_lines(entries: &[SolverEntry], users: &[UserRecord]) -> Vec<String> {
    let names = name_index(users);
    entries
        .iter()
        .map(|e| {
            let name = name_of(&names, &e.user_id);
            if e.first_blood {
                format!("{}. @{} (first blood)", e.position, name)
            } else {
                format!("{}. @{}", e.position, name)
            }
        })
        .collect()
}

pub fn leaderboard_title() -> String {
    "Leaderboard".to_string()
}

pub fn solvers_title(challenge: &ChallengeName) -> String {
    format!("Solvers of {challenge}")
}

/// One window of a cached list with prev/next controls bound to the snapshot it came from.
pub fn page_response(
    snapshot: &ListSnapshot,
    page: &RenderedPage<'_>,
    delivery: DeliveryMode,
) -> OutboundResponse {
    let mut text = format!("{}\n\n", page.title);
    text.push_str(&page.lines.join("\n"));
    let mut options = Vec::with_capacity(2);
    if page.window.has_prev {
        options.push(ResponseOption::turn(
            "Prev",
            PageTurn {
                list: snapshot.kind,
                snapshot_id: snapshot.snapshot_id.clone(),
                page: page.window.page - 1,
            },
        ));
    }
    if page.window.has_next {
        options.push(ResponseOption::turn(
            "Next",
            PageTurn {
                list: snapshot.kind,
                snapshot_id: snapshot.snapshot_id.clone(),
                page: page.window.page + 1,
            },
        ));
    }
    let response = match delivery {
        DeliveryMode::NewMessage => OutboundResponse::message(ResponseStatus::Ok, text),
        DeliveryMode::EditPrevious => OutboundResponse::edit(ResponseStatus::Ok, text),
    };
    response.with_options(options)
}

pub fn help_text(privileged: bool) -> String {
    let mut out = String::from("Commands:\n");
    for entry in Command::menu() {
        if entry.privileged && !privileged {
            continue;
        }
        out.push('/');
        out.push_str(entry.name);
        out.push_str(" - ");
        if entry.privileged {
            out.push_str("(Admin) ");
        }
        out.push_str(entry.description);
        out.push('\n');
    }
    out
}

pub fn category_options(to: fn(Category) -> Selection) -> Vec<ResponseOption> {
    Category::all()
        .iter()
        .map(|c| ResponseOption::select(c.as_str(), to(*c)))
        .collect()
}

pub fn level_options() -> Vec<ResponseOption> {
    DifficultyLevel::all()
        .iter()
        .map(|l| ResponseOption::select(l.as_str(), Selection::FlowLevel(*l)))
        .collect()
}

/// Challenge names labelled with their distinct-solver badge.
pub fn challenge_list_options(
    challenges: &[ChallengeRecord],
    solver_counts: &BTreeMap<ChallengeName, u32>,
) -> Vec<ResponseOption> {
    challenges
        .iter()
        .map(|c| {
            let solvers = solver_counts.get(&c.name).copied().unwrap_or(0);
            ResponseOption::select(
                format!("{} [{} solves]", c.name, solvers),
                Selection::ChallengeDetail(c.name.clone()),
            )
        })
        .collect()
}

pub fn challenge_detail_text(record: &ChallengeRecord) -> String {
    format!(
        "{}\nCategory: {}\nPoints: {}\nLevel: {}\nLink: {}",
        record.name,
        record.category.as_str(),
        record.points,
        record.level.as_str(),
        record.reference_link
    )
}

pub fn prompt_response(prompt: &FlowPrompt, delivery: DeliveryMode) -> OutboundResponse {
    let (text, options) = match prompt {
        FlowPrompt::SelectChallenge { offered } => (
            "Select a challenge to submit:".to_string(),
            offered
                .iter()
                .map(|c| ResponseOption::select(c.as_str(), Selection::SubmitChallenge(c.clone())))
                .collect(),
        ),
        FlowPrompt::EnterToken { challenge } => (
            format!("Submit flag for {challenge}. Send only the flag."),
            Vec::new(),
        ),
        FlowPrompt::SelectCategory => (
            "Select a category:".to_string(),
            category_options(Selection::FlowCategory),
        ),
        FlowPrompt::EnterName { category } => (
            format!("Enter challenge name for category {}:", category.as_str()),
            Vec::new(),
        ),
        FlowPrompt::EnterPoints { name } => {
            (format!("Enter points value for {name}:"), Vec::new())
        }
        FlowPrompt::EnterLink { name } => (format!("Enter reference link for {name}:"), Vec::new()),
        FlowPrompt::SelectLevel { name } => (
            format!("Select difficulty level for {name}:"),
            level_options(),
        ),
        FlowPrompt::EnterSecret { name } => {
            (format!("Enter the correct flag string for {name}:"), Vec::new())
        }
    };
    let response = match delivery {
        DeliveryMode::NewMessage => OutboundResponse::message(ResponseStatus::Prompt, text),
        DeliveryMode::EditPrevious => OutboundResponse::edit(ResponseStatus::Prompt, text),
    };
    response.with_options(options)
}

pub fn reconcile_text(drifts: &[PointsDrift], repaired: usize) -> String {
    if drifts.is_empty() {
        return "Points match the submission log.".to_string();
    }
    let mut out = format!("{} user(s) out of step with the submission log:\n", drifts.len());
    for d in drifts {
        out.push_str(&format!(
            "{}: recorded {}, log says {}\n",
            d.user_id, d.recorded, d.projected
        ));
    }
    if repaired > 0 {
        out.push_str(&format!("Repaired {repaired}."));
    } else {
        out.push_str("Run /reconcile repair to fix.");
    }
    out
}

pub fn reprompt_text(reason: RepromptReason) -> String {
    match reason {
        RepromptReason::PointsNotInteger => "Please enter a valid integer for points.".to_string(),
        RepromptReason::PointsOutOfRange { max } => {
            format!("Points must be between 0 and {max}.")
        }
        RepromptReason::InvalidName => {
            "Challenge name must be non-empty printable text.".to_string()
        }
        RepromptReason::InvalidLink => "Reference link must be non-empty printable text.".to_string(),
        RepromptReason::InvalidSecret => "Flag must be non-empty printable text.".to_string(),
    }
}
