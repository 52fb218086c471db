use serde::{Deserialize, Serialize};

use crate::flows::commands::DialogCommand;
use crate::flows::states::{DialogState, FlowEvent, Prompt};

/// Global commands that bypass the state handlers while a dialog is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interrupt {
    AskCancelConfirmation,
    ConfirmCancel,
    RefuseCancel,
}

/// Returns the interrupt for `event`, if any. Outside a dialog nothing is
/// intercepted and the default handling applies.
pub fn intercept(state: Option<DialogState>, event: &FlowEvent) -> Option<Interrupt> {
    state?;
    match event.command()? {
        DialogCommand::Cancel => Some(Interrupt::AskCancelConfirmation),
        DialogCommand::ConfirmCancel => Some(Interrupt::ConfirmCancel),
        DialogCommand::RefuseCancel => Some(Interrupt::RefuseCancel),
        _ => None,
    }
}

/// The prompt that puts the user back where they were before `/cancel`.
pub fn resume_prompt(state: DialogState) -> Prompt {
    match state {
        DialogState::EnterDescription => Prompt::EnterDescription,
        DialogState::WaitDecisionOnAttachment => Prompt::AskAttachmentDecision,
        DialogState::AddAttachment | DialogState::AddNewAttachment => Prompt::AttachmentList,
        DialogState::ConfirmRequest => Prompt::Confirmation,
        DialogState::SelectAttribute => Prompt::SelectAttribute,
        DialogState::EnterNewDescription => Prompt::EnterNewDescription,
    }
}
