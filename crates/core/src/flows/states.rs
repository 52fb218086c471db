use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::flows::commands::DialogCommand;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowGraph {
    Creation,
    Update,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogState {
    EnterDescription,
    WaitDecisionOnAttachment,
    AddAttachment,
    ConfirmRequest,
    SelectAttribute,
    EnterNewDescription,
    AddNewAttachment,
}

impl DialogState {
    pub const ALL: [DialogState; 7] = [
        DialogState::EnterDescription,
        DialogState::WaitDecisionOnAttachment,
        DialogState::AddAttachment,
        DialogState::ConfirmRequest,
        DialogState::SelectAttribute,
        DialogState::EnterNewDescription,
        DialogState::AddNewAttachment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnterDescription => "enter_description",
            Self::WaitDecisionOnAttachment => "wait_decision_on_attachment",
            Self::AddAttachment => "add_attachment",
            Self::ConfirmRequest => "confirm_request",
            Self::SelectAttribute => "select_attribute",
            Self::EnterNewDescription => "enter_new_description",
            Self::AddNewAttachment => "add_new_attachment",
        }
    }

    pub fn graph(self) -> FlowGraph {
        match self {
            Self::EnterDescription
            | Self::WaitDecisionOnAttachment
            | Self::AddAttachment
            | Self::ConfirmRequest => FlowGraph::Creation,
            Self::SelectAttribute | Self::EnterNewDescription | Self::AddNewAttachment => {
                FlowGraph::Update
            }
        }
    }
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownDialogState(pub String);

impl fmt::Display for UnknownDialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown dialog state `{}`", self.0)
    }
}

impl std::error::Error for UnknownDialogState {}

impl FromStr for DialogState {
    type Err = UnknownDialogState;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == value)
            .ok_or_else(|| UnknownDialogState(value.to_owned()))
    }
}

/// Inbound user input, classified once before it reaches the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    Empty,
    Text,
    Command(DialogCommand),
}

impl FlowEvent {
    pub fn classify(body: &str) -> Self {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        match DialogCommand::parse(trimmed) {
            Some(command) => Self::Command(command),
            None => Self::Text,
        }
    }

    pub fn command(&self) -> Option<DialogCommand> {
        match self {
            Self::Command(command) => Some(*command),
            Self::Empty | Self::Text => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentCheck {
    #[default]
    Absent,
    Accepted,
    Rejected,
}

/// Facts about the inbound message that the engine cannot compute itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowContext {
    pub text_exceeds_limit: bool,
    pub attachment: AttachmentCheck,
}

/// Prompts a transition asks the runtime to render.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prompt {
    EnterDescription,
    DescriptionTooLong,
    InvalidAttachment,
    AskAttachmentDecision,
    /// Staged names with the send-to-confirm bubble, or the add prompt when
    /// nothing is staged.
    AttachmentList,
    AddAttachment,
    TextInsteadOfAttachment,
    Confirmation,
    MustConfirm,
    SelectAttribute,
    EnterNewDescription,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    ClearStagedAttachments,
    InitializeDraft,
    StoreDescription,
    StageAttachment,
    SnapshotAttachmentNames,
    SubmitTicket,
    Reply(Prompt),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: Option<DialogState>,
    pub to: Option<DialogState>,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}

impl TransitionOutcome {
    pub fn stays(&self) -> bool {
        self.from == self.to
    }
}
