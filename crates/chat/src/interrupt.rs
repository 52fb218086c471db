use tracing::info;

use deskbot_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use deskbot_core::domain::conversation::ConversationRef;
use deskbot_core::domain::session::DialogSession;
use deskbot_core::flows::{resume_prompt, Interrupt};

use crate::blocks::OutgoingMessage;
use crate::dialog::DialogRuntime;
use crate::errors::DialogError;
use crate::events::{EventContext, IncomingMessage};

impl DialogRuntime {
    /// Executes a cancel-protocol command. Only `ConfirmCancel` touches
    /// storage; the other two leave state and draft as they were.
    pub(crate) async fn run_interrupt(
        &self,
        interrupt: Interrupt,
        message: &IncomingMessage,
        conversation: &ConversationRef,
        session: Option<DialogSession>,
        ctx: &EventContext,
    ) -> Result<Vec<OutgoingMessage>, DialogError> {
        let chat_id = &message.chat_id;
        match interrupt {
            Interrupt::AskCancelConfirmation => Ok(vec![self.replies.confirm_cancel(chat_id)]),
            Interrupt::ConfirmCancel => {
                self.attachments.delete_all(&message.sender.user_id).await?;
                self.sessions.clear(conversation).await?;

                let audit = self.audit_context(conversation, ctx);
                self.audit.emit(
                    AuditEvent::new(
                        audit.conversation_id,
                        audit.correlation_id,
                        "dialog.cancelled",
                        AuditCategory::Flow,
                        audit.actor,
                        AuditOutcome::Success,
                    )
                    .with_metadata(
                        "state",
                        session.as_ref().map(|session| session.state.as_str()).unwrap_or("none"),
                    ),
                );
                info!(
                    event_name = "dialog.cancelled",
                    correlation_id = %ctx.correlation_id,
                    conversation_id = %conversation,
                    "dialog cancelled by user"
                );
                Ok(vec![self.replies.cancelled(chat_id)])
            }
            Interrupt::RefuseCancel => {
                let Some(session) = session else {
                    return Ok(vec![self.replies.default_reply(chat_id)?]);
                };
                let prompt = resume_prompt(session.state);
                Ok(vec![
                    self.render_prompt(chat_id, prompt, &session.draft, &message.sender.user_id)
                        .await?,
                ])
            }
        }
    }
}
