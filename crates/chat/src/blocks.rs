use serde::Serialize;

use deskbot_core::flows::DialogCommand;

pub const CREATE_REQUEST_LABEL: &str = "Create a new request";
pub const CANCEL_LABEL: &str = "CANCEL";
pub const YES_LABEL: &str = "Yes";
pub const NO_LABEL: &str = "No";
pub const SEND_REQUEST_LABEL: &str = "Send request";
pub const EDIT_REQUEST_LABEL: &str = "Edit";
pub const SKIP_LABEL: &str = "Skip";
pub const UPDATE_DESCRIPTION_LABEL: &str = "Problem description";
pub const UPDATE_ATTACHMENT_LABEL: &str = "Files";
pub const BACK_LABEL: &str = "Back";

/// A button that sends `command` as the message body when pressed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Button {
    pub command: String,
    pub label: String,
}

impl Button {
    pub fn new(command: DialogCommand, label: impl Into<String>) -> Self {
        Self { command: command.as_str().to_owned(), label: label.into() }
    }
}

/// Rows of buttons. Bubbles hang under the message, the keyboard replaces
/// the input field.
pub type ButtonRows = Vec<Vec<Button>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub chat_id: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bubbles: ButtonRows,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keyboard: ButtonRows,
}

impl OutgoingMessage {
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.bubbles.iter().chain(self.keyboard.iter()).flatten().map(|b| b.command.as_str())
    }
}

pub struct MessageBuilder {
    chat_id: String,
    body: String,
    bubbles: ButtonRows,
    keyboard: ButtonRows,
}

impl MessageBuilder {
    pub fn new(chat_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            body: body.into(),
            bubbles: Vec::new(),
            keyboard: Vec::new(),
        }
    }

    pub fn bubble(mut self, command: DialogCommand, label: &str) -> Self {
        self.bubbles.push(vec![Button::new(command, label)]);
        self
    }

    pub fn key(mut self, command: DialogCommand, label: &str) -> Self {
        self.keyboard.push(vec![Button::new(command, label)]);
        self
    }

    pub fn cancel_keyboard(self) -> Self {
        self.key(DialogCommand::Cancel, CANCEL_LABEL)
    }

    pub fn default_bubbles(self) -> Self {
        self.bubble(DialogCommand::CreateRequest, CREATE_REQUEST_LABEL)
    }

    pub fn build(self) -> OutgoingMessage {
        OutgoingMessage {
            chat_id: self.chat_id,
            body: self.body,
            bubbles: self.bubbles,
            keyboard: self.keyboard,
        }
    }
}
