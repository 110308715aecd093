#![forbid(unsafe_code)]

use std::{
    env,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use flagdesk_kernel_contracts::event::{
    Command, InboundEvent, InboundPayload, OutboundResponse, EVENT_CONTRACT_VERSION,
};
use flagdesk_kernel_contracts::identity::{DisplayName, UserId};
use flagdesk_kernel_contracts::TimestampMs;
use flagdesk_os::authz::RootIdentity;
use flagdesk_os::ledger::ReversalReport;
use flagdesk_os::retry::RetryPolicy;
use flagdesk_os::{CommandDispatcher, OsConfig, SessionStore};
use flagdesk_storage::repo::PendingDeletionRepo;
use flagdesk_storage::{FlagdeskStore, SharedStore};
use tracing::{info, warn};

pub const ENV_ROOT_ADMIN_USERNAME: &str = "FLAGDESK_ROOT_ADMIN_USERNAME";
pub const ENV_ROOT_ADMIN_USERNAME_ALIAS: &str = "ADMIN_USERNAME";
pub const ENV_ROOT_ADMIN_USER_ID: &str = "FLAGDESK_ROOT_ADMIN_USER_ID";
pub const ENV_STORE_RETRY_ATTEMPTS: &str = "FLAGDESK_STORE_RETRY_ATTEMPTS";
pub const ENV_STORE_RETRY_BACKOFF_MS: &str = "FLAGDESK_STORE_RETRY_BACKOFF_MS";

pub mod reason_codes {
    pub const ADAPTER_INVALID_USER_ID: &str = "ADAPTER_INVALID_USER_ID";
    pub const ADAPTER_STORE_READ_FAILED: &str = "ADAPTER_STORE_READ_FAILED";
}

/// One inbound chat event as delivered by the messaging front end.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EventAdapterRequest {
    pub user_id: i64,
    pub username: Option<String>,
    pub received_at_ms: Option<u64>,
    pub payload: InboundPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EventAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub response: Option<OutboundResponse>,
}

impl EventAdapterResponse {
    pub fn rejected(reason: String) -> Self {
        Self {
            status: "error".to_string(),
            outcome: "REJECTED".to_string(),
            reason: Some(reason),
            response: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub pending_deletions: usize,
    pub active_sessions: usize,
}

impl AdapterHealthResponse {
    pub fn unhealthy(reason: String) -> Self {
        Self {
            status: "error".to_string(),
            outcome: "UNHEALTHY".to_string(),
            reason: Some(reason),
            pending_deletions: 0,
            active_sessions: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterRuntime {
    dispatcher: Arc<CommandDispatcher>,
    store: SharedStore,
    sessions: Arc<SessionStore>,
}

impl Default for AdapterRuntime {
    fn default() -> Self {
        Self::new(OsConfig::mvp_v1(), FlagdeskStore::new_in_memory())
    }
}

impl AdapterRuntime {
    pub fn new(config: OsConfig, store: FlagdeskStore) -> Self {
        Self {
            dispatcher: Arc::new(CommandDispatcher::new(config)),
            store: SharedStore::new(store),
            sessions: Arc::new(SessionStore::new()),
        }
    }

    pub fn default_from_env() -> Result<Self, String> {
        let config = build_os_config_from_env_var_map(|key| env::var(key).ok())?;
        Ok(Self::new(config, FlagdeskStore::new_in_memory()))
    }

    /// Finishes cascading deletes a previous process left half done.
    pub fn resume_pending_deletions(&self) -> Result<Vec<ReversalReport>, String> {
        let mut store = self.store.clone();
        let reports = self
            .dispatcher
            .ledger()
            .resume_pending_deletions(&mut store)
            .map_err(|err| format!("pending deletion resume failed: {err}"))?;
        for report in &reports {
            info!(
                challenge = %report.challenge,
                users_reversed = report.users_reversed,
                submissions_deleted = report.submissions_deleted,
                "pending deletion resumed"
            );
        }
        Ok(reports)
    }

    pub fn handle_event(&self, request: EventAdapterRequest) -> Result<EventAdapterResponse, String> {
        let user_id = UserId::new(request.user_id).map_err(|err| {
            format!("{}: {err}", reason_codes::ADAPTER_INVALID_USER_ID)
        })?;
        let display_name = match request.username.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match DisplayName::parse_handle(raw) {
                Ok(name) => Some(name),
                // The name is optional; an unusable one must not lock the user out.
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "ignoring unusable username");
                    None
                }
            },
        };
        // Payload validation is left to the dispatcher so a bad reply inside a flow gets a
        // corrective re-prompt instead of a transport error.
        let event = InboundEvent {
            schema_version: EVENT_CONTRACT_VERSION,
            user_id,
            display_name,
            received_at: TimestampMs(request.received_at_ms.unwrap_or_else(system_time_now_ms)),
            payload: command_from_slash_text(request.payload),
        };

        // Each repo call takes the store lock on its own, so retry backoff never blocks
        // other users.
        let mut store = self.store.clone();
        let response = self.dispatcher.handle(&mut store, &self.sessions, &event);
        Ok(EventAdapterResponse {
            status: "ok".to_string(),
            outcome: "DISPATCHED".to_string(),
            reason: None,
            response: Some(response),
        })
    }

    pub fn health_report(&self) -> Result<AdapterHealthResponse, String> {
        let pending_deletions = self
            .store
            .pending_deletion_rows()
            .map_err(|err| format!("{}: {err}", reason_codes::ADAPTER_STORE_READ_FAILED))?
            .len();
        let (outcome, reason) = if pending_deletions == 0 {
            ("HEALTHY", None)
        } else {
            (
                "DEGRADED",
                Some(format!("{pending_deletions} cascading delete(s) pending")),
            )
        };
        Ok(AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: outcome.to_string(),
            reason,
            pending_deletions,
            active_sessions: self.sessions.active_sessions(),
        })
    }
}

/// Chat front ends deliver commands as plain `/name args` messages. Text that parses as a
/// known command is dispatched as that command; anything else stays free text.
fn command_from_slash_text(payload: InboundPayload) -> InboundPayload {
    match payload {
        InboundPayload::FreeText { text } => match Command::parse_line(&text) {
            Some(command) => InboundPayload::Command { command },
            None => InboundPayload::FreeText { text },
        },
        other => other,
    }
}

/// Root identity comes from the environment. A value that is present but unusable is a
/// startup error; retry tuning outside its range falls back to the default.
pub fn build_os_config_from_env_var_map<F>(lookup: F) -> Result<OsConfig, String>
where
    F: Fn(&str) -> Option<String>,
{
    let root = build_root_identity_from_env_var_map(&lookup)?;
    if root == RootIdentity::none() {
        warn!("no root admin configured; privileged commands need an admin grant");
    }
    let defaults = RetryPolicy::mvp_v1();
    let retry = RetryPolicy {
        max_attempts: lookup(ENV_STORE_RETRY_ATTEMPTS)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|v| (1..=10).contains(v))
            .unwrap_or(defaults.max_attempts),
        backoff: lookup(ENV_STORE_RETRY_BACKOFF_MS)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v <= 30_000)
            .map(Duration::from_millis)
            .unwrap_or(defaults.backoff),
    };
    Ok(OsConfig::mvp_v1().with_root(root).with_retry(retry))
}

fn build_root_identity_from_env_var_map<F>(lookup: &F) -> Result<RootIdentity, String>
where
    F: Fn(&str) -> Option<String>,
{
    let username = lookup(ENV_ROOT_ADMIN_USERNAME)
        .or_else(|| lookup(ENV_ROOT_ADMIN_USERNAME_ALIAS))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| {
            DisplayName::parse_handle(&v)
                .map_err(|err| format!("{ENV_ROOT_ADMIN_USERNAME} is invalid: {err}"))
        })
        .transpose()?;
    let user_id = lookup(ENV_ROOT_ADMIN_USER_ID)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<i64>()
                .map_err(|err| err.to_string())
                .and_then(|id| UserId::new(id).map_err(|err| err.to_string()))
                .map_err(|err| format!("{ENV_ROOT_ADMIN_USER_ID} is invalid: {err}"))
        })
        .transpose()?;
    Ok(RootIdentity { username, user_id })
}

fn system_time_now_ms() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(1);
    u64::try_from(millis).unwrap_or(u64::MAX)
}
