use std::fmt;

use serde::{Deserialize, Serialize};

/// The command vocabulary recognized at the chat boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogCommand {
    CreateRequest,
    Help,
    Cancel,
    ConfirmCancel,
    RefuseCancel,
    SendRequest,
    SendToConfirm,
    UpdateRequest,
    ConfirmAttachmentAddition,
    RefuseAttachmentAddition,
    Skip,
    UpdateDescription,
    UpdateAttachment,
    Back,
}

impl DialogCommand {
    pub const ALL: [DialogCommand; 14] = [
        DialogCommand::CreateRequest,
        DialogCommand::Help,
        DialogCommand::Cancel,
        DialogCommand::ConfirmCancel,
        DialogCommand::RefuseCancel,
        DialogCommand::SendRequest,
        DialogCommand::SendToConfirm,
        DialogCommand::UpdateRequest,
        DialogCommand::ConfirmAttachmentAddition,
        DialogCommand::RefuseAttachmentAddition,
        DialogCommand::Skip,
        DialogCommand::UpdateDescription,
        DialogCommand::UpdateAttachment,
        DialogCommand::Back,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateRequest => "/create-request",
            Self::Help => "/help",
            Self::Cancel => "/cancel",
            Self::ConfirmCancel => "/confirm-cancel",
            Self::RefuseCancel => "/refuse-cancel",
            Self::SendRequest => "/send-request",
            Self::SendToConfirm => "/send-to-confirm",
            Self::UpdateRequest => "/update-request",
            Self::ConfirmAttachmentAddition => "/confirm-attachment-addition",
            Self::RefuseAttachmentAddition => "/refuse-attachment-addition",
            Self::Skip => "/skip",
            Self::UpdateDescription => "/update-description",
            Self::UpdateAttachment => "/update-attachment",
            Self::Back => "/back",
        }
    }

    /// Matches the whole body exactly; anything else is free text.
    pub fn parse(body: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.as_str() == body)
    }

    /// Commands advertised to users in help output.
    pub fn is_public(self) -> bool {
        matches!(self, Self::CreateRequest | Self::Help)
    }
}

impl fmt::Display for DialogCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::DialogCommand;

    #[test]
    fn every_command_parses_from_its_literal() {
        for command in DialogCommand::ALL {
            assert_eq!(DialogCommand::parse(command.as_str()), Some(command));
        }
    }

    #[test]
    fn near_misses_are_not_commands() {
        assert_eq!(DialogCommand::parse("/skip now"), None);
        assert_eq!(DialogCommand::parse("skip"), None);
        assert_eq!(DialogCommand::parse("/SKIP"), None);
    }

    #[test]
    fn only_entry_points_are_public() {
        let public: Vec<_> =
            DialogCommand::ALL.into_iter().filter(|command| command.is_public()).collect();
        assert_eq!(public, vec![DialogCommand::CreateRequest, DialogCommand::Help]);
    }
}
