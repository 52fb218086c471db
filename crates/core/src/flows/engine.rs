use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::commands::DialogCommand;
use crate::flows::states::{
    AttachmentCheck, DialogState, FlowAction, FlowContext, FlowEvent, Prompt, TransitionOutcome,
};

pub trait FlowDefinition {
    fn initial_state(&self) -> DialogState;
    fn transition(
        &self,
        current: Option<DialogState>,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Creation and update graphs of the support-request dialog.
#[derive(Clone, Debug, Default)]
pub struct SupportRequestFlow;

impl FlowDefinition for SupportRequestFlow {
    fn initial_state(&self) -> DialogState {
        DialogState::EnterDescription
    }

    fn transition(
        &self,
        current: Option<DialogState>,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_support_request(current, event, context)
    }
}

pub struct DialogEngine<F = SupportRequestFlow> {
    flow: F,
}

impl<F> DialogEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> DialogState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: Option<DialogState>,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: Option<DialogState>,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.conversation_id.clone(),
                        audit.correlation_id.clone(),
                        "dialog.transition_applied",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", state_label(outcome.from))
                    .with_metadata("to", state_label(outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.conversation_id.clone(),
                        audit.correlation_id.clone(),
                        "dialog.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for DialogEngine<SupportRequestFlow> {
    fn default() -> Self {
        Self::new(SupportRequestFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("no active dialog to receive event {event:?}")]
    NoActiveDialog { event: FlowEvent },
}

fn state_label(state: Option<DialogState>) -> String {
    state.map(|state| state.as_str().to_owned()).unwrap_or_else(|| "none".to_owned())
}

fn transition_support_request(
    current: Option<DialogState>,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use DialogState::{
        AddAttachment, AddNewAttachment, ConfirmRequest, EnterDescription, EnterNewDescription,
        SelectAttribute, WaitDecisionOnAttachment,
    };
    use FlowAction::{
        ClearStagedAttachments, InitializeDraft, Reply, SnapshotAttachmentNames, StageAttachment,
        StoreDescription, SubmitTicket,
    };

    let Some(state) = current else {
        return match event.command() {
            Some(DialogCommand::CreateRequest) => Ok(TransitionOutcome {
                from: None,
                to: Some(EnterDescription),
                event: event.clone(),
                actions: vec![
                    ClearStagedAttachments,
                    InitializeDraft,
                    Reply(Prompt::EnterDescription),
                ],
            }),
            _ => Err(FlowTransitionError::NoActiveDialog { event: event.clone() }),
        };
    };

    let (to, actions) = match state {
        // Any non-empty body is the description here, commands included.
        EnterDescription => match event {
            FlowEvent::Empty => (Some(state), vec![Reply(Prompt::EnterDescription)]),
            FlowEvent::Text | FlowEvent::Command(_) if context.text_exceeds_limit => {
                (Some(state), vec![Reply(Prompt::DescriptionTooLong)])
            }
            FlowEvent::Text | FlowEvent::Command(_) => match context.attachment {
                AttachmentCheck::Accepted => (
                    Some(ConfirmRequest),
                    vec![
                        StoreDescription,
                        StageAttachment,
                        SnapshotAttachmentNames,
                        Reply(Prompt::Confirmation),
                    ],
                ),
                AttachmentCheck::Rejected => {
                    (Some(state), vec![Reply(Prompt::InvalidAttachment)])
                }
                AttachmentCheck::Absent => (
                    Some(WaitDecisionOnAttachment),
                    vec![StoreDescription, Reply(Prompt::AskAttachmentDecision)],
                ),
            },
        },
        WaitDecisionOnAttachment => match event.command() {
            Some(DialogCommand::ConfirmAttachmentAddition) => (
                Some(AddAttachment),
                vec![SnapshotAttachmentNames, Reply(Prompt::AttachmentList)],
            ),
            Some(DialogCommand::RefuseAttachmentAddition) => (
                Some(ConfirmRequest),
                vec![ClearStagedAttachments, SnapshotAttachmentNames, Reply(Prompt::Confirmation)],
            ),
            _ => (Some(state), vec![Reply(Prompt::AskAttachmentDecision)]),
        },
        AddAttachment | AddNewAttachment => match event.command() {
            Some(DialogCommand::Skip) => (
                Some(ConfirmRequest),
                vec![ClearStagedAttachments, SnapshotAttachmentNames, Reply(Prompt::Confirmation)],
            ),
            Some(DialogCommand::SendToConfirm) => {
                (Some(ConfirmRequest), vec![SnapshotAttachmentNames, Reply(Prompt::Confirmation)])
            }
            _ => match context.attachment {
                AttachmentCheck::Absent => {
                    (Some(state), vec![Reply(Prompt::TextInsteadOfAttachment)])
                }
                AttachmentCheck::Rejected => {
                    (Some(state), vec![Reply(Prompt::InvalidAttachment)])
                }
                AttachmentCheck::Accepted => (
                    Some(state),
                    vec![StageAttachment, SnapshotAttachmentNames, Reply(Prompt::AttachmentList)],
                ),
            },
        },
        ConfirmRequest => match event.command() {
            Some(DialogCommand::SendRequest) => (None, vec![SubmitTicket]),
            Some(DialogCommand::UpdateRequest) => {
                (Some(SelectAttribute), vec![Reply(Prompt::SelectAttribute)])
            }
            _ => (Some(state), vec![Reply(Prompt::MustConfirm)]),
        },
        SelectAttribute => match event.command() {
            Some(DialogCommand::UpdateDescription) => {
                (Some(EnterNewDescription), vec![Reply(Prompt::EnterNewDescription)])
            }
            Some(DialogCommand::UpdateAttachment) => (
                Some(AddNewAttachment),
                vec![ClearStagedAttachments, Reply(Prompt::AddAttachment)],
            ),
            Some(DialogCommand::Back) => (Some(ConfirmRequest), vec![Reply(Prompt::Confirmation)]),
            _ => (Some(state), vec![Reply(Prompt::SelectAttribute)]),
        },
        EnterNewDescription => match event {
            FlowEvent::Empty => (Some(state), vec![Reply(Prompt::EnterNewDescription)]),
            FlowEvent::Text | FlowEvent::Command(_) if context.text_exceeds_limit => {
                (Some(state), vec![Reply(Prompt::DescriptionTooLong)])
            }
            FlowEvent::Text | FlowEvent::Command(_) => {
                (Some(ConfirmRequest), vec![StoreDescription, Reply(Prompt::Confirmation)])
            }
        },
    };

    Ok(TransitionOutcome { from: Some(state), to, event: event.clone(), actions })
}
