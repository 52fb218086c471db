//! Chat Integration - bot runtime for the support-request dialog
//!
//! This crate connects chat traffic to the dialog engine in `deskbot-core`:
//! - **Runner** (`runner`) - pumps envelopes from a `ChatTransport` with reconnection logic
//! - **Events** (`events`) - incoming messages and chat-created notifications
//! - **Dialog** (`dialog`) - executes engine transitions against storage and submission
//! - **Replies** (`replies`, `blocks`) - message bodies, bubbles and keyboards
//!
//! # Architecture
//!
//! ```text
//! ChatTransport → BotRunner → EventDispatcher → DialogRuntime → DialogEngine
//!                     ↑                               ↓
//!               OutgoingMessage  ←  ReplyRenderer  ←  FlowAction::Reply
//! ```
//!
//! # Key Types
//!
//! - `BotRunner` - sequential event loop; one envelope is fully handled before the next
//! - `DialogRuntime` - interrupt check, transition, side effects, single session write
//! - `ReplyRenderer` - tera-backed texts plus per-prompt markup

pub mod audit;
pub mod blocks;
pub mod commands;
pub mod dialog;
pub mod errors;
pub mod events;
mod interrupt;
pub mod replies;
pub mod runner;

pub use blocks::{Button, OutgoingMessage};
pub use dialog::DialogRuntime;
pub use errors::DialogError;
pub use events::{
    default_dispatcher, ChatEnvelope, ChatEvent, EventContext, EventDispatcher, HandlerResult,
    IncomingAttachment, IncomingMessage, Sender,
};
pub use replies::{ReplyRenderer, ReplySettings};
pub use runner::{BotRunner, ChatTransport, ReconnectPolicy, TransportError};
