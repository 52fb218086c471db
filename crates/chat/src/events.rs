use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use deskbot_core::domain::conversation::{ConversationRef, Requester, UserId};

use crate::blocks::OutgoingMessage;
use crate::dialog::DialogRuntime;
use crate::replies::{RenderError, ReplyRenderer};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEnvelope {
    pub envelope_id: String,
    pub event: ChatEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    Message(IncomingMessage),
    ChatCreated(ChatCreatedEvent),
    Unsupported { event_type: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::Message(_) => ChatEventType::Message,
            Self::ChatCreated(_) => ChatEventType::ChatCreated,
            Self::Unsupported { .. } => ChatEventType::Unsupported,
        }
    }

    pub fn chat_id(&self) -> Option<&str> {
        match self {
            Self::Message(message) => Some(&message.chat_id),
            Self::ChatCreated(event) => Some(&event.chat_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    Message,
    ChatCreated,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub username: Option<String>,
    pub platform: Option<String>,
    pub host: Option<String>,
}

impl Sender {
    pub fn requester(&self) -> Requester {
        Requester {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            platform: self.platform.clone(),
            host: self.host.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

impl IncomingAttachment {
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub bot_id: String,
    pub chat_id: String,
    pub sender: Sender,
    pub body: String,
    pub attachment: Option<IncomingAttachment>,
}

impl IncomingMessage {
    pub fn conversation(&self) -> ConversationRef {
        ConversationRef::new(self.chat_id.clone(), self.sender.user_id.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatCreatedEvent {
    pub bot_id: String,
    pub chat_id: String,
    pub creator_id: Option<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(Vec<OutgoingMessage>),
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChatEventType;
    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChatEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn default_dispatcher(runtime: Arc<DialogRuntime>) -> EventDispatcher {
    let replies = runtime.replies();
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(runtime));
    dispatcher.register(ChatCreatedHandler::new(replies));
    dispatcher
}

/// Feeds user messages into the dialog runtime. Dialog failures become the
/// user-safe reply for the error; they never escape as dispatch errors.
pub struct MessageHandler {
    runtime: Arc<DialogRuntime>,
}

impl MessageHandler {
    pub fn new(runtime: Arc<DialogRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl EventHandler for MessageHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Message
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::Message(message) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        match self.runtime.handle_message(message, ctx).await {
            Ok(replies) => Ok(HandlerResult::Responded(replies)),
            Err(error) => {
                warn!(
                    event_name = "dialog.event_failed",
                    correlation_id = %ctx.correlation_id,
                    conversation_id = %message.conversation(),
                    transient = error.is_transient(),
                    error = %error,
                    "dialog event failed; replying with user-safe message"
                );
                let reply =
                    self.runtime.replies().failure(&message.chat_id, error.user_message());
                Ok(HandlerResult::Responded(vec![reply]))
            }
        }
    }
}

pub struct ChatCreatedHandler {
    replies: Arc<ReplyRenderer>,
}

impl ChatCreatedHandler {
    pub fn new(replies: Arc<ReplyRenderer>) -> Self {
        Self { replies }
    }
}

#[async_trait]
impl EventHandler for ChatCreatedHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::ChatCreated
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::ChatCreated(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(HandlerResult::Responded(vec![self.replies.chat_created(&event.chat_id)?]))
    }
}
