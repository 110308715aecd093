#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::catalog::{Category, ChallengeName, DifficultyLevel};
use crate::common::validate_free_text;
use crate::identity::{DisplayName, UserId};
use crate::session::{ListKind, SnapshotId};
use crate::{ContractViolation, SchemaVersion, TimestampMs, Validate};

pub const EVENT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const FREE_TEXT_MAX_LEN: usize = 4_096;
pub const COMMAND_ARG_MAX_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Start,
    Help,
    Submit,
    MyPoints,
    ViewChallenges,
    Leaderboard,
    Bloods { challenge: Option<String> },
    AddFlag,
    AddAdmin { username: Option<String> },
    Delete { challenge: Option<String> },
    ViewUsers,
    ViewSubmissions,
    Reconcile {
        #[serde(default)]
        repair: bool,
    },
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub privileged: bool,
}

const COMMAND_MENU: &[CommandSpec] = &[
    CommandSpec {
        name: "start",
        description: "Start the bot",
        privileged: false,
    },
    CommandSpec {
        name: "help",
        description: "Show all commands",
        privileged: false,
    },
    CommandSpec {
        name: "submit",
        description: "Start flag submission",
        privileged: false,
    },
    CommandSpec {
        name: "myviewpoints",
        description: "View your points",
        privileged: false,
    },
    CommandSpec {
        name: "viewchallenges",
        description: "List all challenges",
        privileged: false,
    },
    CommandSpec {
        name: "leaderboard",
        description: "View top users",
        privileged: false,
    },
    CommandSpec {
        name: "bloods",
        description: "View solvers of a challenge",
        privileged: false,
    },
    CommandSpec {
        name: "addflag",
        description: "Add or update a challenge",
        privileged: true,
    },
    CommandSpec {
        name: "addnewadmins",
        description: "Grant admin rights",
        privileged: true,
    },
    CommandSpec {
        name: "delete",
        description: "Delete a challenge",
        privileged: true,
    },
    CommandSpec {
        name: "viewusers",
        description: "View registered users",
        privileged: true,
    },
    CommandSpec {
        name: "viewsubmissions",
        description: "View submissions log",
        privileged: true,
    },
    CommandSpec {
        name: "reconcile",
        description: "Audit points against the submission log (add 'repair' to fix)",
        privileged: true,
    },
    CommandSpec {
        name: "cancel",
        description: "Cancel the current operation",
        privileged: false,
    },
];

impl Command {
    pub const fn menu() -> &'static [CommandSpec] {
        COMMAND_MENU
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Submit => "submit",
            Self::MyPoints => "myviewpoints",
            Self::ViewChallenges => "viewchallenges",
            Self::Leaderboard => "leaderboard",
            Self::Bloods { .. } => "bloods",
            Self::AddFlag => "addflag",
            Self::AddAdmin { .. } => "addnewadmins",
            Self::Delete { .. } => "delete",
            Self::ViewUsers => "viewusers",
            Self::ViewSubmissions => "viewsubmissions",
            Self::Reconcile { .. } => "reconcile",
            Self::Cancel => "cancel",
        }
    }

    pub fn is_privileged(&self) -> bool {
        let name = self.name();
        COMMAND_MENU
            .iter()
            .any(|entry| entry.name == name && entry.privileged)
    }

    /// Parses a slash-command line such as `/delete Baby RSA` or `/leaderboard@bot`.
    /// Returns `None` for text that is not a known command.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let rest = line.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let joined_args = || {
            let joined = args.split_whitespace().collect::<Vec<_>>().join(" ");
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        };
        let cmd = match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "submit" => Self::Submit,
            "myviewpoints" | "mypoints" => Self::MyPoints,
            "viewchallenges" => Self::ViewChallenges,
            "leaderboard" => Self::Leaderboard,
            "bloods" => Self::Bloods {
                challenge: joined_args(),
            },
            "addflag" => Self::AddFlag,
            "addnewadmins" => {
                let mut parts = args.split_whitespace();
                let username = match (parts.next(), parts.next()) {
                    (Some(one), None) => Some(one.to_string()),
                    _ => None,
                };
                Self::AddAdmin { username }
            }
            "delete" => Self::Delete {
                challenge: joined_args(),
            },
            "viewusers" => Self::ViewUsers,
            "viewsubmissions" => Self::ViewSubmissions,
            "reconcile" => Self::Reconcile {
                repair: args.eq_ignore_ascii_case("repair"),
            },
            "cancel" => Self::Cancel,
            _ => return None,
        };
        Some(cmd)
    }

    fn argument(&self) -> Option<&str> {
        match self {
            Self::Bloods { challenge } | Self::Delete { challenge } => challenge.as_deref(),
            Self::AddAdmin { username } => username.as_deref(),
            _ => None,
        }
    }
}

/// A value chosen from a previously rendered option list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    BrowseCategory(Category),
    ChallengeDetail(ChallengeName),
    SolverDirectory(ChallengeName),
    SubmitChallenge(ChallengeName),
    FlowCategory(Category),
    FlowLevel(DifficultyLevel),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTurn {
    pub list: ListKind,
    pub snapshot_id: SnapshotId,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundPayload {
    Command { command: Command },
    Selection { selection: Selection },
    FreeText { text: String },
    PageTurn { page_turn: PageTurn },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub schema_version: SchemaVersion,
    pub user_id: UserId,
    pub display_name: Option<DisplayName>,
    pub received_at: TimestampMs,
    pub payload: InboundPayload,
}

impl InboundEvent {
    pub fn v1(
        user_id: UserId,
        display_name: Option<DisplayName>,
        received_at: TimestampMs,
        payload: InboundPayload,
    ) -> Result<Self, ContractViolation> {
        let event = Self {
            schema_version: EVENT_CONTRACT_VERSION,
            user_id,
            display_name,
            received_at,
            payload,
        };
        event.validate()?;
        Ok(event)
    }
}

impl Validate for InboundEvent {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != EVENT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "inbound_event.schema_version",
                reason: "must match EVENT_CONTRACT_VERSION",
            });
        }
        match &self.payload {
            InboundPayload::FreeText { text } => {
                validate_free_text("inbound_event.free_text", text, FREE_TEXT_MAX_LEN)
            }
            InboundPayload::Command { command } => match command.argument() {
                Some(arg) => {
                    validate_free_text("inbound_event.command_argument", arg, COMMAND_ARG_MAX_LEN)
                }
                None => Ok(()),
            },
            InboundPayload::Selection { .. } | InboundPayload::PageTurn { .. } => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    NewMessage,
    EditPrevious,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Ok,
    Prompt,
    Unauthorized,
    NotFound,
    ValidationFailure,
    Expired,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptionAction {
    Select { selection: Selection },
    Turn { page_turn: PageTurn },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseOption {
    pub label: String,
    pub action: OptionAction,
}

impl ResponseOption {
    pub fn select(label: impl Into<String>, selection: Selection) -> Self {
        Self {
            label: label.into(),
            action: OptionAction::Select { selection },
        }
    }

    pub fn turn(label: impl Into<String>, page_turn: PageTurn) -> Self {
        Self {
            label: label.into(),
            action: OptionAction::Turn { page_turn },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundResponse {
    pub delivery: DeliveryMode,
    pub status: ResponseStatus,
    pub text: String,
    pub options: Vec<ResponseOption>,
}

impl OutboundResponse {
    pub fn message(status: ResponseStatus, text: impl Into<String>) -> Self {
        Self {
            delivery: DeliveryMode::NewMessage,
            status,
            text: text.into(),
            options: Vec::new(),
        }
    }

    pub fn edit(status: ResponseStatus, text: impl Into<String>) -> Self {
        Self {
            delivery: DeliveryMode::EditPrevious,
            status,
            text: text.into(),
            options: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: Vec<ResponseOption>) -> Self {
        self.options = options;
        self
    }

    pub fn has_turn_to(&self, page: u32) -> bool {
        self.options.iter().any(|o| {
            matches!(&o.action, OptionAction::Turn { page_turn } if page_turn.page == page)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_event_01_parse_command_lines() {
        assert_eq!(Command::parse_line("/leaderboard"), Some(Command::Leaderboard));
        assert_eq!(
            Command::parse_line("/leaderboard@flagdesk_bot"),
            Some(Command::Leaderboard)
        );
        assert_eq!(
            Command::parse_line("/delete  Baby   RSA "),
            Some(Command::Delete {
                challenge: Some("Baby RSA".to_string())
            })
        );
        assert_eq!(
            Command::parse_line("/delete"),
            Some(Command::Delete { challenge: None })
        );
        assert_eq!(Command::parse_line("flag{not_a_command}"), None);
        assert_eq!(Command::parse_line("/frobnicate"), None);
    }

    #[test]
    fn at_event_02_addnewadmins_requires_exactly_one_argument() {
        assert_eq!(
            Command::parse_line("/addnewadmins @alice"),
            Some(Command::AddAdmin {
                username: Some("@alice".to_string())
            })
        );
        assert_eq!(
            Command::parse_line("/addnewadmins alice bob"),
            Some(Command::AddAdmin { username: None })
        );
    }

    #[test]
    fn at_event_03_privileged_commands_follow_menu() {
        assert!(Command::AddFlag.is_privileged());
        assert!(Command::Delete { challenge: None }.is_privileged());
        assert!(!Command::Submit.is_privileged());
        assert!(!Command::Cancel.is_privileged());
        assert!(Command::Reconcile { repair: false }.is_privileged());
        assert_eq!(Command::menu().len(), 14);
        assert_eq!(
            Command::parse_line("/reconcile Repair"),
            Some(Command::Reconcile { repair: true })
        );
        assert_eq!(
            Command::parse_line("/reconcile"),
            Some(Command::Reconcile { repair: false })
        );
    }

    #[test]
    fn at_event_04_blank_free_text_is_rejected() {
        let user = UserId::new(5).unwrap();
        let blank = InboundEvent::v1(
            user,
            None,
            TimestampMs(1),
            InboundPayload::FreeText {
                text: " \n ".to_string(),
            },
        );
        assert!(blank.is_err());
    }

    #[test]
    fn at_event_05_wire_format_is_tagged() {
        let payload: InboundPayload = serde_json::from_str(
            r#"{"type":"page_turn","page_turn":{"list":"leaderboard","snapshot_id":"ab12","page":1}}"#,
        )
        .unwrap();
        assert_eq!(
            payload,
            InboundPayload::PageTurn {
                page_turn: PageTurn {
                    list: ListKind::Leaderboard,
                    snapshot_id: SnapshotId("ab12".to_string()),
                    page: 1,
                }
            }
        );
        let cmd: InboundPayload =
            serde_json::from_str(r#"{"type":"command","command":{"command":"submit"}}"#).unwrap();
        assert_eq!(
            cmd,
            InboundPayload::Command {
                command: Command::Submit
            }
        );
    }
}
