use std::sync::Arc;

use tracing::{debug, info, warn};

use deskbot_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use deskbot_core::domain::conversation::{ConversationRef, UserId};
use deskbot_core::domain::session::DialogSession;
use deskbot_core::domain::ticket::{SubmissionRequest, TicketDraft, TicketSubmitter};
use deskbot_core::flows::{
    intercept, AttachmentCheck, DialogCommand, DialogEngine, FlowAction, FlowContext, FlowEvent,
    Prompt,
};
use deskbot_db::{AttachmentStore, RepositoryError, SessionRepository};

use crate::audit::TracingAuditSink;
use crate::blocks::OutgoingMessage;
use crate::errors::DialogError;
use crate::events::{EventContext, IncomingMessage};
use crate::replies::ReplyRenderer;

pub(crate) const AUDIT_ACTOR: &str = "dialog-runtime";

/// Runs one inbound message through the interrupt filter and the dialog
/// engine, executes the resulting actions and persists the session once.
///
/// A failing action returns before anything is persisted, so the stored
/// state stays that of the previous event. Staging side effects that already
/// happened are not rolled back. The exception is a ticket the submitter
/// accepted: from then on the dialog is over and cleanup failures are only
/// logged.
pub struct DialogRuntime {
    pub(crate) engine: DialogEngine,
    pub(crate) sessions: Arc<dyn SessionRepository>,
    pub(crate) attachments: Arc<dyn AttachmentStore>,
    pub(crate) submitter: Arc<dyn TicketSubmitter>,
    pub(crate) replies: Arc<ReplyRenderer>,
    pub(crate) audit: Arc<dyn AuditSink>,
}

impl DialogRuntime {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        attachments: Arc<dyn AttachmentStore>,
        submitter: Arc<dyn TicketSubmitter>,
        replies: Arc<ReplyRenderer>,
    ) -> Self {
        Self {
            engine: DialogEngine::default(),
            sessions,
            attachments,
            submitter,
            replies,
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn replies(&self) -> Arc<ReplyRenderer> {
        Arc::clone(&self.replies)
    }

    pub async fn handle_message(
        &self,
        message: &IncomingMessage,
        ctx: &EventContext,
    ) -> Result<Vec<OutgoingMessage>, DialogError> {
        let conversation = message.conversation();
        let session = self.load_session(&conversation, ctx).await?;
        let event = FlowEvent::classify(&message.body);
        let state = session.as_ref().map(|session| session.state);

        debug!(
            event_name = "dialog.event_received",
            correlation_id = %ctx.correlation_id,
            conversation_id = %conversation,
            state = state.map(|state| state.as_str()).unwrap_or("none"),
            event = ?event,
            has_attachment = message.attachment.is_some(),
            "dialog event received"
        );

        if let Some(interrupt) = intercept(state, &event) {
            return self.run_interrupt(interrupt, message, &conversation, session, ctx).await;
        }

        if state.is_none() {
            match event.command() {
                Some(DialogCommand::CreateRequest) => {}
                Some(DialogCommand::Help) => return Ok(vec![self.replies.help(&message.chat_id)?]),
                _ => return Ok(vec![self.replies.default_reply(&message.chat_id)?]),
            }
        }

        let context = self.flow_context(message).await?;
        let audit = self.audit_context(&conversation, ctx);
        let outcome =
            self.engine.apply_with_audit(state, &event, &context, self.audit.as_ref(), &audit)?;

        let user = &message.sender.user_id;
        let mut draft = session.map(|session| session.draft).unwrap_or_default();
        let mut replies = Vec::new();
        let mut submitted = false;

        for action in &outcome.actions {
            match action {
                FlowAction::ClearStagedAttachments => self.attachments.delete_all(user).await?,
                FlowAction::InitializeDraft => {
                    draft = TicketDraft::new(
                        self.replies.subject(message.sender.username.as_deref())?,
                    );
                }
                FlowAction::StoreDescription => draft.description = Some(message.body.clone()),
                FlowAction::StageAttachment => {
                    if let Some(attachment) = &message.attachment {
                        self.attachments.add(user, &attachment.filename, &attachment.content).await?;
                    }
                }
                FlowAction::SnapshotAttachmentNames => {
                    draft.attachment_names = self.attachments.list_names(user).await?;
                }
                FlowAction::SubmitTicket => {
                    self.submit(message, &conversation, &draft, &audit).await?;
                    submitted = true;
                    replies.push(self.replies.success(&message.chat_id));
                }
                FlowAction::Reply(prompt) => {
                    replies.push(self.render_prompt(&message.chat_id, *prompt, &draft, user).await?);
                }
            }
        }

        match outcome.to {
            Some(next) => {
                self.sessions.save(&conversation, &DialogSession::new(next, draft)).await?;
            }
            // `submit` already dropped the session.
            None if submitted => {}
            None => self.sessions.clear(&conversation).await?,
        }

        info!(
            event_name = "dialog.transition_persisted",
            correlation_id = %ctx.correlation_id,
            conversation_id = %conversation,
            from = outcome.from.map(|state| state.as_str()).unwrap_or("none"),
            to = outcome.to.map(|state| state.as_str()).unwrap_or("none"),
            "dialog transition persisted"
        );

        Ok(replies)
    }

    /// A row that no longer decodes is dropped and treated as no dialog, so
    /// the user can always start over.
    async fn load_session(
        &self,
        conversation: &ConversationRef,
        ctx: &EventContext,
    ) -> Result<Option<DialogSession>, DialogError> {
        match self.sessions.load(conversation).await {
            Ok(session) => Ok(session),
            Err(RepositoryError::Decode(detail)) => {
                warn!(
                    event_name = "dialog.session_discarded",
                    correlation_id = %ctx.correlation_id,
                    conversation_id = %conversation,
                    error = %detail,
                    "stored dialog session could not be decoded; starting over"
                );
                self.sessions.clear(conversation).await?;
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn flow_context(&self, message: &IncomingMessage) -> Result<FlowContext, DialogError> {
        let max_length = self.replies.settings().max_description_length;
        let attachment = match &message.attachment {
            None => AttachmentCheck::Absent,
            Some(attachment) => {
                if self.attachments.is_valid(&message.sender.user_id, attachment.size()).await? {
                    AttachmentCheck::Accepted
                } else {
                    AttachmentCheck::Rejected
                }
            }
        };

        Ok(FlowContext { text_exceeds_limit: message.body.chars().count() > max_length, attachment })
    }

    pub(crate) fn audit_context(
        &self,
        conversation: &ConversationRef,
        ctx: &EventContext,
    ) -> AuditContext {
        AuditContext::new(Some(conversation.storage_key()), ctx.correlation_id.clone(), AUDIT_ACTOR)
    }

    /// Renders `prompt`; attachment lists always reflect the staging area.
    pub(crate) async fn render_prompt(
        &self,
        chat_id: &str,
        prompt: Prompt,
        draft: &TicketDraft,
        user: &UserId,
    ) -> Result<OutgoingMessage, DialogError> {
        let staged = match prompt {
            Prompt::AttachmentList => self.attachments.list_names(user).await?,
            _ => Vec::new(),
        };
        Ok(self.replies.prompt(chat_id, prompt, draft, &staged)?)
    }

    /// Only a failure before or inside `TicketSubmitter::submit` is returned.
    /// Once the ticket is accepted the session is dropped first, then
    /// staging is cleared; failures of either are logged.
    async fn submit(
        &self,
        message: &IncomingMessage,
        conversation: &ConversationRef,
        draft: &TicketDraft,
        audit: &AuditContext,
    ) -> Result<(), DialogError> {
        let user = &message.sender.user_id;
        let ticket = draft.finalize()?;
        let request = SubmissionRequest {
            ticket,
            requester: message.sender.requester(),
            attachments: self.attachments.load_all(user).await?,
        };

        let attachment_count = request.attachments.len();
        if let Err(error) = self.submitter.submit(&request).await {
            self.audit.emit(
                AuditEvent::new(
                    audit.conversation_id.clone(),
                    audit.correlation_id.clone(),
                    "submission.failed",
                    AuditCategory::Submission,
                    audit.actor.clone(),
                    AuditOutcome::Failed,
                )
                .with_metadata("error", error.to_string()),
            );
            return Err(error.into());
        }

        if let Err(error) = self.sessions.clear(conversation).await {
            warn!(
                event_name = "submission.session_cleanup_failed",
                correlation_id = %audit.correlation_id,
                conversation_id = %conversation,
                error = %error,
                "ticket sent but dialog session could not be cleared"
            );
        }
        if let Err(error) = self.attachments.delete_all(user).await {
            warn!(
                event_name = "submission.staging_cleanup_failed",
                correlation_id = %audit.correlation_id,
                user_id = %user,
                error = %error,
                "ticket sent but staged attachments could not be deleted"
            );
        }
        self.audit.emit(
            AuditEvent::new(
                audit.conversation_id.clone(),
                audit.correlation_id.clone(),
                "submission.sent",
                AuditCategory::Submission,
                audit.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("attachment_count", attachment_count.to_string()),
        );
        info!(
            event_name = "submission.sent",
            correlation_id = %audit.correlation_id,
            user_id = %user,
            attachment_count,
            "support request submitted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use deskbot_core::audit::InMemoryAuditSink;
    use deskbot_core::domain::attachment::{AttachmentLimits, StagedAttachment, StagingUsage};
    use deskbot_core::domain::conversation::{ConversationRef, UserId};
    use deskbot_core::domain::session::DialogSession;
    use deskbot_core::domain::ticket::{
        SubmissionError, SubmissionRequest, TicketDraft, TicketSubmitter,
    };
    use deskbot_core::flows::DialogState;
    use deskbot_db::{
        AttachmentStore, InMemoryAttachmentStore, InMemorySessionRepository, RepositoryError,
        SessionRepository,
    };

    use super::DialogRuntime;
    use crate::events::{EventContext, IncomingAttachment, IncomingMessage, Sender};
    use crate::replies::{ReplyRenderer, ReplySettings, SOMETHING_WENT_WRONG_MESSAGE};

    #[derive(Default)]
    struct RecordingSubmitter {
        requests: Mutex<Vec<SubmissionRequest>>,
    }

    #[async_trait]
    impl TicketSubmitter for RecordingSubmitter {
        async fn submit(&self, request: &SubmissionRequest) -> Result<(), SubmissionError> {
            self.requests.lock().await.push(request.clone());
            Ok(())
        }
    }

    struct Harness {
        runtime: DialogRuntime,
        sessions: Arc<InMemorySessionRepository>,
        attachments: Arc<InMemoryAttachmentStore>,
        submitter: Arc<RecordingSubmitter>,
        audit: InMemoryAuditSink,
    }

    fn harness(settings: ReplySettings) -> Harness {
        let sessions = Arc::new(InMemorySessionRepository::default());
        let attachments = Arc::new(InMemoryAttachmentStore::new(settings.limits));
        let submitter = Arc::new(RecordingSubmitter::default());
        let audit = InMemoryAuditSink::default();
        let replies = Arc::new(ReplyRenderer::new(settings).expect("templates compile"));
        let runtime =
            DialogRuntime::new(sessions.clone(), attachments.clone(), submitter.clone(), replies)
                .with_audit_sink(Arc::new(audit.clone()));
        Harness { runtime, sessions, attachments, submitter, audit }
    }

    fn message(body: &str) -> IncomingMessage {
        IncomingMessage {
            bot_id: "deskbot".to_owned(),
            chat_id: "chat-1".to_owned(),
            sender: Sender {
                user_id: UserId("user-1".to_owned()),
                username: Some("ivan".to_owned()),
                platform: Some("web".to_owned()),
                host: Some("cts.example.com".to_owned()),
            },
            body: body.to_owned(),
            attachment: None,
        }
    }

    fn with_file(body: &str, filename: &str, size: usize) -> IncomingMessage {
        IncomingMessage {
            attachment: Some(IncomingAttachment {
                filename: filename.to_owned(),
                content: vec![7; size],
            }),
            ..message(body)
        }
    }

    async fn send(harness: &Harness, message: IncomingMessage) -> Vec<crate::OutgoingMessage> {
        harness.runtime.handle_message(&message, &EventContext::default()).await.expect("handled")
    }

    async fn state(harness: &Harness) -> Option<DialogState> {
        harness.sessions.state(&message("").conversation()).await.expect("state")
    }

    #[tokio::test]
    async fn create_request_clears_stale_staging_and_sets_subject() {
        let harness = harness(ReplySettings::default());
        let user = UserId("user-1".to_owned());
        harness.attachments.add(&user, "old.txt", b"stale").await.expect("stage");

        send(&harness, message("/create-request")).await;

        assert!(harness.attachments.list_names(&user).await.expect("list").is_empty());
        let session = harness
            .sessions
            .load(&message("").conversation())
            .await
            .expect("load")
            .expect("session exists");
        assert_eq!(session.state, DialogState::EnterDescription);
        assert_eq!(session.draft.subject, "Support request (ivan)");
    }

    #[tokio::test]
    async fn description_with_file_goes_to_confirmation_with_names() {
        let harness = harness(ReplySettings::default());
        send(&harness, message("/create-request")).await;

        let replies = send(&harness, with_file("Screen is black", "shot.png", 16)).await;

        assert_eq!(state(&harness).await, Some(DialogState::ConfirmRequest));
        assert!(replies[0].body.contains("- shot.png"));
        assert!(replies[0].body.contains("Screen is black"));
    }

    #[tokio::test]
    async fn idle_help_and_unknown_input_do_not_start_a_dialog() {
        let harness = harness(ReplySettings::default());

        let help = send(&harness, message("/help")).await;
        assert!(help[0].body.contains("/create-request"));

        let default = send(&harness, message("hello?")).await;
        assert_eq!(default[0].commands().collect::<Vec<_>>(), vec!["/create-request"]);

        let cancel = send(&harness, message("/cancel")).await;
        assert_eq!(cancel, default);

        assert_eq!(state(&harness).await, None);
    }

    #[tokio::test]
    async fn oversized_file_in_add_state_is_rejected_without_staging() {
        let harness = harness(ReplySettings {
            limits: AttachmentLimits { max_count: 5, max_file_size: 10, max_total_size: 15 },
            ..ReplySettings::default()
        });
        send(&harness, message("/create-request")).await;
        send(&harness, message("Printer jams")).await;
        send(&harness, message("/confirm-attachment-addition")).await;
        send(&harness, with_file("", "a.bin", 10)).await;

        let replies = send(&harness, with_file("", "b.bin", 6)).await;

        assert_eq!(
            replies[0].commands().collect::<Vec<_>>(),
            vec!["/send-to-confirm", "/cancel"]
        );
        assert_eq!(
            harness.attachments.list_names(&UserId("user-1".to_owned())).await.expect("list"),
            vec!["a.bin"]
        );
        assert_eq!(state(&harness).await, Some(DialogState::AddAttachment));
    }

    #[tokio::test]
    async fn submission_clears_staging_and_records_audit() {
        let harness = harness(ReplySettings::default());
        send(&harness, message("/create-request")).await;
        send(&harness, with_file("Laptop fan is loud", "noise.mp3", 32)).await;

        let replies = send(&harness, message("/send-request")).await;

        assert!(replies[0].body.contains("Your request has been sent"));
        let requests = harness.submitter.requests.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].attachments.len(), 1);
        assert_eq!(requests[0].requester.display_name(), "ivan");
        assert!(harness
            .attachments
            .list_names(&UserId("user-1".to_owned()))
            .await
            .expect("list")
            .is_empty());
        assert!(harness.audit.events().iter().any(|event| event.event_type == "submission.sent"));
    }

    /// Session store whose rows can be made undecodable or unreachable.
    #[derive(Default)]
    struct FaultySessions {
        inner: InMemorySessionRepository,
        undecodable: AtomicBool,
        unreachable: AtomicBool,
    }

    #[async_trait]
    impl SessionRepository for FaultySessions {
        async fn load(
            &self,
            conversation: &ConversationRef,
        ) -> Result<Option<DialogSession>, RepositoryError> {
            if self.unreachable.load(Ordering::SeqCst) {
                return Err(RepositoryError::Io(std::io::Error::other("disk unavailable")));
            }
            if self.undecodable.load(Ordering::SeqCst) {
                return Err(RepositoryError::Decode("unknown dialog state `LEGACY`".to_owned()));
            }
            self.inner.load(conversation).await
        }

        async fn save(
            &self,
            conversation: &ConversationRef,
            session: &DialogSession,
        ) -> Result<(), RepositoryError> {
            self.inner.save(conversation, session).await
        }

        async fn clear(&self, conversation: &ConversationRef) -> Result<(), RepositoryError> {
            self.undecodable.store(false, Ordering::SeqCst);
            self.inner.clear(conversation).await
        }
    }

    /// Staging area whose bulk delete can be switched to fail.
    #[derive(Default)]
    struct StuckStaging {
        inner: InMemoryAttachmentStore,
        fail_delete: AtomicBool,
    }

    #[async_trait]
    impl AttachmentStore for StuckStaging {
        fn limits(&self) -> AttachmentLimits {
            self.inner.limits()
        }

        async fn add(
            &self,
            user: &UserId,
            filename: &str,
            content: &[u8],
        ) -> Result<String, RepositoryError> {
            self.inner.add(user, filename, content).await
        }

        async fn list_names(&self, user: &UserId) -> Result<Vec<String>, RepositoryError> {
            self.inner.list_names(user).await
        }

        async fn load_all(&self, user: &UserId) -> Result<Vec<StagedAttachment>, RepositoryError> {
            self.inner.load_all(user).await
        }

        async fn delete_all(&self, user: &UserId) -> Result<(), RepositoryError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(RepositoryError::Io(std::io::Error::other("file is locked")));
            }
            self.inner.delete_all(user).await
        }

        async fn usage(&self, user: &UserId) -> Result<StagingUsage, RepositoryError> {
            self.inner.usage(user).await
        }
    }

    fn runtime_with(
        sessions: Arc<dyn SessionRepository>,
        attachments: Arc<dyn AttachmentStore>,
        submitter: Arc<RecordingSubmitter>,
    ) -> DialogRuntime {
        let replies = Arc::new(ReplyRenderer::new(ReplySettings::default()).expect("templates"));
        DialogRuntime::new(sessions, attachments, submitter, replies)
    }

    #[tokio::test]
    async fn accepted_ticket_ends_the_dialog_even_when_staging_cleanup_fails() {
        let sessions = Arc::new(InMemorySessionRepository::default());
        let staging = Arc::new(StuckStaging::default());
        let submitter = Arc::new(RecordingSubmitter::default());
        let runtime = runtime_with(sessions.clone(), staging.clone(), submitter.clone());
        let ctx = EventContext::default();

        runtime.handle_message(&message("/create-request"), &ctx).await.expect("create");
        runtime
            .handle_message(&with_file("Monitor flickers", "video.mp4", 8), &ctx)
            .await
            .expect("describe");
        staging.fail_delete.store(true, Ordering::SeqCst);

        let first = runtime.handle_message(&message("/send-request"), &ctx).await.expect("send");
        assert!(first[0].body.contains("Your request has been sent"));
        assert_eq!(sessions.state(&message("").conversation()).await.expect("state"), None);

        let second =
            runtime.handle_message(&message("/send-request"), &ctx).await.expect("resend");
        assert_eq!(second[0].commands().collect::<Vec<_>>(), vec!["/create-request"]);
        assert_eq!(submitter.requests.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn undecodable_session_is_dropped_and_the_user_can_start_over() {
        let sessions = Arc::new(FaultySessions::default());
        let submitter = Arc::new(RecordingSubmitter::default());
        let runtime = runtime_with(
            sessions.clone(),
            Arc::new(InMemoryAttachmentStore::default()),
            submitter.clone(),
        );
        let ctx = EventContext::default();
        let conversation = message("").conversation();
        let stale = DialogSession::new(DialogState::ConfirmRequest, TicketDraft::new("S"));
        sessions.inner.save(&conversation, &stale).await.expect("seed");
        sessions.undecodable.store(true, Ordering::SeqCst);

        let replies = runtime.handle_message(&message("/send-request"), &ctx).await.expect("handled");

        assert_eq!(replies[0].commands().collect::<Vec<_>>(), vec!["/create-request"]);
        assert_eq!(sessions.inner.state(&conversation).await.expect("state"), None);
        assert!(submitter.requests.lock().await.is_empty());

        runtime.handle_message(&message("/create-request"), &ctx).await.expect("restart");
        assert_eq!(
            sessions.inner.state(&conversation).await.expect("state"),
            Some(DialogState::EnterDescription)
        );
    }

    #[tokio::test]
    async fn unreachable_session_store_surfaces_as_transient_error() {
        let sessions = Arc::new(FaultySessions::default());
        sessions.unreachable.store(true, Ordering::SeqCst);
        let runtime = runtime_with(
            sessions,
            Arc::new(InMemoryAttachmentStore::default()),
            Arc::new(RecordingSubmitter::default()),
        );

        let error = runtime
            .handle_message(&message("Printer jams"), &EventContext::default())
            .await
            .expect_err("load fails");
        assert!(error.is_transient());
        assert_eq!(error.user_message(), SOMETHING_WENT_WRONG_MESSAGE);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn default_audit_sink_writes_to_tracing() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);
        let runtime = runtime_with(
            Arc::new(InMemorySessionRepository::default()),
            Arc::new(InMemoryAttachmentStore::default()),
            Arc::new(RecordingSubmitter::default()),
        );

        runtime
            .handle_message(&message("/create-request"), &EventContext::default())
            .await
            .expect("handled");

        let output = String::from_utf8(logs.0.lock().expect("log buffer").clone()).expect("utf8");
        assert!(output.contains("audit event"));
        assert!(output.contains("dialog.transition_applied"));
    }
}
