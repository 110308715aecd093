#![forbid(unsafe_code)]

use flagdesk_kernel_contracts::catalog::{
    Category, ChallengeName, CHALLENGE_POINTS_MAX, REFERENCE_LINK_MAX_LEN, SECRET_TOKEN_MAX_LEN,
};
use flagdesk_kernel_contracts::event::Selection;
use flagdesk_kernel_contracts::session::{
    ActiveFlow, ChallengeDraft, EntryCreationStep, FlowKind, SubmissionFlowState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub max_points: u32,
}

impl WorkflowConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_points: CHALLENGE_POINTS_MAX,
        }
    }
}

/// One inbound step as the flow sees it. Commands other than cancel never reach a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowInput<'a> {
    Select(&'a Selection),
    Text(&'a str),
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowPrompt {
    SelectChallenge { offered: Vec<ChallengeName> },
    EnterToken { challenge: ChallengeName },
    SelectCategory,
    EnterName { category: Category },
    EnterPoints { name: ChallengeName },
    EnterLink { name: ChallengeName },
    SelectLevel { name: ChallengeName },
    EnterSecret { name: ChallengeName },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepromptReason {
    PointsNotInteger,
    PointsOutOfRange { max: u32 },
    InvalidName,
    InvalidLink,
    InvalidSecret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEffect {
    Prompt(FlowPrompt),
    /// Input had the right shape but failed to parse; the step did not advance.
    Reprompt {
        prompt: FlowPrompt,
        reason: RepromptReason,
    },
    /// Input of the wrong shape for the current step (e.g. text while a selection is awaited).
    NotAccepted { prompt: FlowPrompt },
    NothingLeft,
    RecordAttempt {
        challenge: ChallengeName,
        token: String,
    },
    UpsertChallenge(ChallengeDraft),
    Cancelled { flow: Option<FlowKind> },
    NoActiveFlow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStep {
    pub next: ActiveFlow,
    pub effect: WorkflowEffect,
}

impl WorkflowStep {
    fn stay(flow: ActiveFlow, effect: WorkflowEffect) -> Self {
        Self { next: flow, effect }
    }

    fn finish(effect: WorkflowEffect) -> Self {
        Self {
            next: ActiveFlow::Idle,
            effect,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowRuntime {
    config: WorkflowConfig,
}

impl WorkflowRuntime {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    /// `unsolved` is the set of challenges the caller has no correct submission for.
    pub fn start_submission(&self, unsolved: Vec<ChallengeName>) -> WorkflowStep {
        if unsolved.is_empty() {
            return WorkflowStep::finish(WorkflowEffect::NothingLeft);
        }
        WorkflowStep {
            next: ActiveFlow::Submission(SubmissionFlowState::SelectChallenge {
                offered: unsolved.clone(),
            }),
            effect: WorkflowEffect::Prompt(FlowPrompt::SelectChallenge { offered: unsolved }),
        }
    }

    pub fn start_entry_creation(&self) -> WorkflowStep {
        WorkflowStep {
            next: ActiveFlow::EntryCreation(EntryCreationStep::Category),
            effect: WorkflowEffect::Prompt(FlowPrompt::SelectCategory),
        }
    }

    pub fn advance(&self, flow: ActiveFlow, input: FlowInput<'_>) -> WorkflowStep {
        if input == FlowInput::Cancel {
            return WorkflowStep::finish(WorkflowEffect::Cancelled { flow: flow.kind() });
        }
        match flow {
            ActiveFlow::Idle => WorkflowStep::finish(WorkflowEffect::NoActiveFlow),
            ActiveFlow::Submission(state) => self.advance_submission(state, input),
            ActiveFlow::EntryCreation(step) => self.advance_entry_creation(step, input),
        }
    }

    fn advance_submission(&self, state: SubmissionFlowState, input: FlowInput<'_>) -> WorkflowStep {
        match (state, input) {
            (
                SubmissionFlowState::SelectChallenge { .. },
                FlowInput::Select(Selection::SubmitChallenge(challenge)),
            ) => WorkflowStep {
                next: ActiveFlow::Submission(SubmissionFlowState::AwaitToken {
                    challenge: challenge.clone(),
                }),
                effect: WorkflowEffect::Prompt(FlowPrompt::EnterToken {
                    challenge: challenge.clone(),
                }),
            },
            (SubmissionFlowState::AwaitToken { challenge }, FlowInput::Text(text)) => {
                WorkflowStep::finish(WorkflowEffect::RecordAttempt {
                    challenge,
                    token: text.trim().to_string(),
                })
            }
            (state, _) => {
                let prompt = submission_prompt(&state);
                WorkflowStep::stay(
                    ActiveFlow::Submission(state),
                    WorkflowEffect::NotAccepted { prompt },
                )
            }
        }
    }

    fn advance_entry_creation(&self, step: EntryCreationStep, input: FlowInput<'_>) -> WorkflowStep {
        use EntryCreationStep as S;

        match (step, input) {
            (S::Category, FlowInput::Select(Selection::FlowCategory(category))) => {
                let category = *category;
                advance_to(
                    S::Name { category },
                    FlowPrompt::EnterName { category },
                )
            }
            (S::Name { category }, FlowInput::Text(text)) => match ChallengeName::new(text) {
                Ok(name) => advance_to(
                    S::Points {
                        category,
                        name: name.clone(),
                    },
                    FlowPrompt::EnterPoints { name },
                ),
                Err(_) => reprompt(S::Name { category }, RepromptReason::InvalidName),
            },
            (S::Points { category, name }, FlowInput::Text(text)) => {
                match parse_points(text, self.config.max_points) {
                    Ok(points) => advance_to(
                        S::Link {
                            category,
                            name: name.clone(),
                            points,
                        },
                        FlowPrompt::EnterLink { name },
                    ),
                    Err(reason) => reprompt(S::Points { category, name }, reason),
                }
            }
            (
                S::Link {
                    category,
                    name,
                    points,
                },
                FlowInput::Text(text),
            ) => {
                let link = text.trim();
                if link.is_empty() || link.chars().count() > REFERENCE_LINK_MAX_LEN {
                    return reprompt(
                        S::Link {
                            category,
                            name,
                            points,
                        },
                        RepromptReason::InvalidLink,
                    );
                }
                advance_to(
                    S::Level {
                        category,
                        name: name.clone(),
                        points,
                        link: link.to_string(),
                    },
                    FlowPrompt::SelectLevel { name },
                )
            }
            (
                S::Level {
                    category,
                    name,
                    points,
                    link,
                },
                FlowInput::Select(Selection::FlowLevel(level)),
            ) => advance_to(
                S::Token {
                    category,
                    name: name.clone(),
                    points,
                    link,
                    level: *level,
                },
                FlowPrompt::EnterSecret { name },
            ),
            (
                S::Token {
                    category,
                    name,
                    points,
                    link,
                    level,
                },
                FlowInput::Text(text),
            ) => {
                let draft = ChallengeDraft {
                    category,
                    name,
                    points,
                    reference_link: link,
                    level,
                    secret_token: text.trim().to_string(),
                };
                if draft.secret_token.chars().count() > SECRET_TOKEN_MAX_LEN
                    || draft.clone().into_record().is_err()
                {
                    let ChallengeDraft {
                        category,
                        name,
                        points,
                        reference_link,
                        level,
                        ..
                    } = draft;
                    return reprompt(
                        S::Token {
                            category,
                            name,
                            points,
                            link: reference_link,
                            level,
                        },
                        RepromptReason::InvalidSecret,
                    );
                }
                WorkflowStep::finish(WorkflowEffect::UpsertChallenge(draft))
            }
            (step, _) => {
                let prompt = entry_prompt(&step);
                WorkflowStep::stay(
                    ActiveFlow::EntryCreation(step),
                    WorkflowEffect::NotAccepted { prompt },
                )
            }
        }
    }
}

fn advance_to(step: EntryCreationStep, prompt: FlowPrompt) -> WorkflowStep {
    WorkflowStep {
        next: ActiveFlow::EntryCreation(step),
        effect: WorkflowEffect::Prompt(prompt),
    }
}

fn reprompt(step: EntryCreationStep, reason: RepromptReason) -> WorkflowStep {
    let prompt = entry_prompt(&step);
    WorkflowStep::stay(
        ActiveFlow::EntryCreation(step),
        WorkflowEffect::Reprompt { prompt, reason },
    )
}

fn parse_points(text: &str, max: u32) -> Result<u32, RepromptReason> {
    let value: i64 = text
        .trim()
        .parse()
        .map_err(|_| RepromptReason::PointsNotInteger)?;
    if value < 0 || value > i64::from(max) {
        return Err(RepromptReason::PointsOutOfRange { max });
    }
    u32::try_from(value).map_err(|_| RepromptReason::PointsOutOfRange { max })
}

/// Prompt for the step the flow is currently waiting on.
pub fn current_prompt(flow: &ActiveFlow) -> Option<FlowPrompt> {
    match flow {
        ActiveFlow::Idle => None,
        ActiveFlow::Submission(state) => Some(submission_prompt(state)),
        ActiveFlow::EntryCreation(step) => Some(entry_prompt(step)),
    }
}

fn submission_prompt(state: &SubmissionFlowState) -> FlowPrompt {
    match state {
        SubmissionFlowState::SelectChallenge { offered } => FlowPrompt::SelectChallenge {
            offered: offered.clone(),
        },
        SubmissionFlowState::AwaitToken { challenge } => FlowPrompt::EnterToken {
            challenge: challenge.clone(),
        },
    }
}

fn entry_prompt(step: &EntryCreationStep) -> FlowPrompt {
    match step {
        EntryCreationStep::Category => FlowPrompt::SelectCategory,
        EntryCreationStep::Name { category } => FlowPrompt::EnterName {
            category: *category,
        },
        EntryCreationStep::Points { name, .. } => FlowPrompt::EnterPoints { name: name.clone() },
        EntryCreationStep::Link { name, .. } => FlowPrompt::EnterLink { name: name.clone() },
        EntryCreationStep::Level { name, .. } => FlowPrompt::SelectLevel { name: name.clone() },
        EntryCreationStep::Token { name, .. } => FlowPrompt::EnterSecret { name: name.clone() },
    }
}
