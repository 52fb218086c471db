use tera::{Context, Tera};
use thiserror::Error;

use deskbot_core::config::AppConfig;
use deskbot_core::domain::attachment::{format_byte_size, AttachmentLimits};
use deskbot_core::domain::ticket::TicketDraft;
use deskbot_core::flows::{DialogCommand, Prompt};

use crate::blocks::{
    MessageBuilder, OutgoingMessage, BACK_LABEL, CANCEL_LABEL, EDIT_REQUEST_LABEL, NO_LABEL,
    SEND_REQUEST_LABEL, SKIP_LABEL, UPDATE_ATTACHMENT_LABEL, UPDATE_DESCRIPTION_LABEL, YES_LABEL,
};
use crate::commands::public_commands;

const SUBJECT: &str = "subject.txt";
const CONFIRM_REQUEST: &str = "confirm_request.txt";
const EXISTING_ATTACHMENTS: &str = "existing_attachments.txt";
const MAX_DESCRIPTION_LENGTH_EXCEEDED: &str = "max_description_length_exceeded.txt";
const HELP: &str = "help.txt";
const DEFAULT: &str = "default.txt";
const CHAT_CREATED: &str = "chat_created.txt";

pub const ENTER_DESCRIPTION_MESSAGE: &str = "❗ Describe the problem in detail: what you do and \
what result you get. Attach a photo or a media file.\n\n⚡ The more complete the description, \
the faster your request is resolved.\n\n📱 Send the request from the device where the problem \
occurred.";

pub const ENTER_NEW_DESCRIPTION_MESSAGE: &str = "❗ Describe the problem in detail: what you \
do and what result you get.\n\n⚡ The more complete the description, the faster your request \
is resolved.\n\n📱 Send the request from the device where the problem occurred.";

pub const CONFIRM_CANCEL_MESSAGE: &str =
    "**Are you sure you want to cancel the request?**\nEntered data will not be saved.";

pub const CANCEL_MESSAGE: &str =
    "Action cancelled.\nWould you like to send a new request to technical support?";

pub const INVALID_ATTACHMENT_MESSAGE: &str = "The file you are uploading exceeds the allowed \
size or number of files.\nPlease reduce the file size and upload it again.\nYou can also press \
**CANCEL** to cancel the request or **SEND REQUEST** to register it without the file.";

pub const CONFIRM_ATTACHMENT_ADDITION_MESSAGE: &str = "Would you like to attach a photo or a \
media file? A screenshot of the problem helps us process your request faster.";

pub const TEXT_INSTEAD_OF_ATTACHMENT_MESSAGE: &str = "At this step you can either add files or \
skip the step.\nIf you want to change the description, press \"CANCEL\" and create the request \
again.";

pub const SELECT_ATTRIBUTE_MESSAGE: &str = "Which field of the request do you want to change?";

pub const MUST_CONFIRM_MESSAGE: &str = "At this step you need to confirm that the entered data \
is correct.\nIf you want to create a new request, press \"CANCEL\".";

pub const SOMETHING_WENT_WRONG_MESSAGE: &str = "Something went wrong while processing your \
message. Please report this to the administrator.";

#[derive(Debug, Error)]
#[error("template `{template}` failed to render: {detail}")]
pub struct RenderError {
    pub template: &'static str,
    pub detail: String,
}

/// Values the reply texts depend on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplySettings {
    pub app_name: String,
    pub email_title: String,
    pub show_sender_name_in_email_title: bool,
    pub limits: AttachmentLimits,
    pub max_description_length: usize,
}

impl ReplySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            app_name: config.bot.app_name.clone(),
            email_title: config.mail.email_title.clone(),
            show_sender_name_in_email_title: config.mail.show_sender_name_in_email_title,
            limits: config.limits.attachment_limits(),
            max_description_length: config.limits.max_description_length,
        }
    }
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self {
            app_name: "eXpress".to_owned(),
            email_title: "Support request".to_owned(),
            show_sender_name_in_email_title: true,
            limits: AttachmentLimits::default(),
            max_description_length: 3500,
        }
    }
}

pub struct ReplyRenderer {
    templates: Tera,
    settings: ReplySettings,
}

impl ReplyRenderer {
    pub fn new(settings: ReplySettings) -> Result<Self, RenderError> {
        let mut templates = Tera::default();
        let raw = [
            (SUBJECT, include_str!("../../../templates/subject.txt")),
            (CONFIRM_REQUEST, include_str!("../../../templates/confirm_request.txt")),
            (EXISTING_ATTACHMENTS, include_str!("../../../templates/existing_attachments.txt")),
            (
                MAX_DESCRIPTION_LENGTH_EXCEEDED,
                include_str!("../../../templates/max_description_length_exceeded.txt"),
            ),
            (HELP, include_str!("../../../templates/help.txt")),
            (DEFAULT, include_str!("../../../templates/default.txt")),
            (CHAT_CREATED, include_str!("../../../templates/chat_created.txt")),
        ];
        for (name, source) in raw {
            templates
                .add_raw_template(name, source)
                .map_err(|error| RenderError { template: name, detail: error.to_string() })?;
        }
        Ok(Self { templates, settings })
    }

    pub fn settings(&self) -> &ReplySettings {
        &self.settings
    }

    fn render(&self, template: &'static str, context: &Context) -> Result<String, RenderError> {
        self.templates
            .render(template, context)
            .map(|text| text.trim_end().to_owned())
            .map_err(|error| RenderError { template, detail: error.to_string() })
    }

    pub fn subject(&self, username: Option<&str>) -> Result<String, RenderError> {
        let mut context = Context::new();
        context.insert("email_title", &self.settings.email_title);
        context.insert("show_sender_name", &self.settings.show_sender_name_in_email_title);
        context.insert("username", username.unwrap_or_default());
        self.render(SUBJECT, &context)
    }

    pub fn add_attachment_text(&self) -> String {
        let limits = self.settings.limits;
        format!(
            "**Send a photo or a media file (optional).**\n\nYou can upload up to {} files, no \
             more than {} each and no more than {} in total.\n\nWhen all files are uploaded, \
             press \"**Send request**\" below the input field.",
            limits.max_count,
            format_byte_size(limits.max_file_size),
            format_byte_size(limits.max_total_size),
        )
    }

    /// Renders a dialog prompt. `staged` is the current staging listing and
    /// only matters for `Prompt::AttachmentList`.
    pub fn prompt(
        &self,
        chat_id: &str,
        prompt: Prompt,
        draft: &TicketDraft,
        staged: &[String],
    ) -> Result<OutgoingMessage, RenderError> {
        let message = match prompt {
            Prompt::EnterDescription => {
                MessageBuilder::new(chat_id, ENTER_DESCRIPTION_MESSAGE).cancel_keyboard()
            }
            Prompt::EnterNewDescription => {
                MessageBuilder::new(chat_id, ENTER_NEW_DESCRIPTION_MESSAGE).cancel_keyboard()
            }
            Prompt::DescriptionTooLong => {
                let mut context = Context::new();
                context.insert("max_description_length", &self.settings.max_description_length);
                MessageBuilder::new(chat_id, self.render(MAX_DESCRIPTION_LENGTH_EXCEEDED, &context)?)
                    .cancel_keyboard()
            }
            Prompt::InvalidAttachment => MessageBuilder::new(chat_id, INVALID_ATTACHMENT_MESSAGE)
                .key(DialogCommand::SendToConfirm, &SEND_REQUEST_LABEL.to_uppercase())
                .key(DialogCommand::Cancel, CANCEL_LABEL),
            Prompt::AskAttachmentDecision => {
                MessageBuilder::new(chat_id, CONFIRM_ATTACHMENT_ADDITION_MESSAGE)
                    .bubble(DialogCommand::ConfirmAttachmentAddition, YES_LABEL)
                    .bubble(DialogCommand::RefuseAttachmentAddition, NO_LABEL)
                    .cancel_keyboard()
            }
            Prompt::AttachmentList if staged.is_empty() => self.add_attachment(chat_id),
            Prompt::AttachmentList => {
                let mut context = Context::new();
                context.insert("attachment_names", staged);
                MessageBuilder::new(chat_id, self.render(EXISTING_ATTACHMENTS, &context)?)
                    .bubble(DialogCommand::SendToConfirm, SEND_REQUEST_LABEL)
                    .cancel_keyboard()
            }
            Prompt::AddAttachment => self.add_attachment(chat_id),
            Prompt::TextInsteadOfAttachment => {
                MessageBuilder::new(chat_id, TEXT_INSTEAD_OF_ATTACHMENT_MESSAGE)
                    .bubble(DialogCommand::Skip, SKIP_LABEL)
                    .cancel_keyboard()
            }
            Prompt::Confirmation => {
                let mut context = Context::new();
                context.insert("subject", &draft.subject);
                context.insert("description", draft.description.as_deref().unwrap_or_default());
                context.insert("attachment_names", &draft.attachment_names);
                MessageBuilder::new(chat_id, self.render(CONFIRM_REQUEST, &context)?)
                    .bubble(DialogCommand::SendRequest, SEND_REQUEST_LABEL)
                    .bubble(DialogCommand::UpdateRequest, EDIT_REQUEST_LABEL)
                    .cancel_keyboard()
            }
            Prompt::MustConfirm => {
                MessageBuilder::new(chat_id, MUST_CONFIRM_MESSAGE).cancel_keyboard()
            }
            Prompt::SelectAttribute => MessageBuilder::new(chat_id, SELECT_ATTRIBUTE_MESSAGE)
                .bubble(DialogCommand::UpdateDescription, UPDATE_DESCRIPTION_LABEL)
                .bubble(DialogCommand::UpdateAttachment, UPDATE_ATTACHMENT_LABEL)
                .key(DialogCommand::Back, BACK_LABEL),
        };
        Ok(message.build())
    }

    fn add_attachment(&self, chat_id: &str) -> MessageBuilder {
        MessageBuilder::new(chat_id, self.add_attachment_text())
            .bubble(DialogCommand::Skip, SKIP_LABEL)
            .cancel_keyboard()
    }

    pub fn confirm_cancel(&self, chat_id: &str) -> OutgoingMessage {
        MessageBuilder::new(chat_id, CONFIRM_CANCEL_MESSAGE)
            .bubble(DialogCommand::ConfirmCancel, YES_LABEL)
            .bubble(DialogCommand::RefuseCancel, NO_LABEL)
            .build()
    }

    pub fn cancelled(&self, chat_id: &str) -> OutgoingMessage {
        MessageBuilder::new(chat_id, CANCEL_MESSAGE).default_bubbles().build()
    }

    pub fn success(&self, chat_id: &str) -> OutgoingMessage {
        let body = format!(
            "Your request has been sent.\nIf more information is needed, a technical support \
             specialist will contact you.\nYou will be notified about the resolution by e-mail \
             or by a personal message in {}.",
            self.settings.app_name
        );
        MessageBuilder::new(chat_id, body).default_bubbles().build()
    }

    pub fn failure(&self, chat_id: &str, body: &str) -> OutgoingMessage {
        MessageBuilder::new(chat_id, body).default_bubbles().build()
    }

    pub fn help(&self, chat_id: &str) -> Result<OutgoingMessage, RenderError> {
        let mut context = Context::new();
        context.insert("app_name", &self.settings.app_name);
        context.insert("commands", &public_commands());
        Ok(MessageBuilder::new(chat_id, self.render(HELP, &context)?).default_bubbles().build())
    }

    pub fn default_reply(&self, chat_id: &str) -> Result<OutgoingMessage, RenderError> {
        let mut context = Context::new();
        context.insert("app_name", &self.settings.app_name);
        Ok(MessageBuilder::new(chat_id, self.render(DEFAULT, &context)?).default_bubbles().build())
    }

    pub fn chat_created(&self, chat_id: &str) -> Result<OutgoingMessage, RenderError> {
        let mut context = Context::new();
        context.insert("app_name", &self.settings.app_name);
        Ok(MessageBuilder::new(chat_id, self.render(CHAT_CREATED, &context)?)
            .default_bubbles()
            .build())
    }
}

#[cfg(test)]
mod tests {
    use deskbot_core::domain::attachment::AttachmentLimits;
    use deskbot_core::domain::ticket::TicketDraft;
    use deskbot_core::flows::Prompt;

    use super::{ReplyRenderer, ReplySettings, ENTER_DESCRIPTION_MESSAGE};

    fn renderer() -> ReplyRenderer {
        ReplyRenderer::new(ReplySettings::default()).expect("templates compile")
    }

    fn draft() -> TicketDraft {
        TicketDraft {
            subject: "Support request (ivan)".to_owned(),
            description: Some("VPN drops every hour".to_owned()),
            attachment_names: vec!["log.txt".to_owned()],
        }
    }

    #[test]
    fn subject_appends_username_only_when_enabled() {
        assert_eq!(renderer().subject(Some("ivan")).expect("subject"), "Support request (ivan)");
        assert_eq!(renderer().subject(None).expect("subject"), "Support request");

        let quiet = ReplyRenderer::new(ReplySettings {
            show_sender_name_in_email_title: false,
            ..ReplySettings::default()
        })
        .expect("templates compile");
        assert_eq!(quiet.subject(Some("ivan")).expect("subject"), "Support request");
    }

    #[test]
    fn confirmation_summarizes_the_draft() {
        let message =
            renderer().prompt("chat-1", Prompt::Confirmation, &draft(), &[]).expect("render");

        assert!(message.body.contains("Support request (ivan)"));
        assert!(message.body.contains("VPN drops every hour"));
        assert!(message.body.contains("- log.txt"));
        assert_eq!(
            message.commands().collect::<Vec<_>>(),
            vec!["/send-request", "/update-request", "/cancel"]
        );
    }

    #[test]
    fn confirmation_without_files_says_none() {
        let mut draft = draft();
        draft.attachment_names.clear();
        let message =
            renderer().prompt("chat-1", Prompt::Confirmation, &draft, &[]).expect("render");

        assert!(message.body.contains("**Files:** none"));
    }

    #[test]
    fn attachment_list_falls_back_to_add_prompt_when_nothing_is_staged() {
        let renderer = renderer();
        let empty =
            renderer.prompt("chat-1", Prompt::AttachmentList, &draft(), &[]).expect("render");
        assert_eq!(empty.body, renderer.add_attachment_text());
        assert_eq!(empty.commands().collect::<Vec<_>>(), vec!["/skip", "/cancel"]);

        let staged = vec!["a (1).txt".to_owned(), "a.txt".to_owned()];
        let listed =
            renderer.prompt("chat-1", Prompt::AttachmentList, &draft(), &staged).expect("render");
        assert!(listed.body.contains("1. a (1).txt\n2. a.txt"));
        assert_eq!(listed.commands().collect::<Vec<_>>(), vec!["/send-to-confirm", "/cancel"]);
    }

    #[test]
    fn add_attachment_text_cites_human_readable_limits() {
        let text = renderer().add_attachment_text();
        assert!(text.contains("up to 20 files"));
        assert!(text.contains("9.9 MiB each"));
        assert!(text.contains("20 MiB in total"));
    }

    #[test]
    fn length_exceeded_cites_configured_maximum() {
        let renderer = ReplyRenderer::new(ReplySettings {
            max_description_length: 42,
            limits: AttachmentLimits::default(),
            ..ReplySettings::default()
        })
        .expect("templates compile");
        let message = renderer
            .prompt("chat-1", Prompt::DescriptionTooLong, &draft(), &[])
            .expect("render");

        assert!(message.body.contains("42 characters"));
    }

    #[test]
    fn enter_description_prompt_is_static_with_cancel_keyboard() {
        let message = renderer()
            .prompt("chat-1", Prompt::EnterDescription, &TicketDraft::default(), &[])
            .expect("render");
        assert_eq!(message.body, ENTER_DESCRIPTION_MESSAGE);
        assert_eq!(message.commands().collect::<Vec<_>>(), vec!["/cancel"]);
    }

    #[test]
    fn help_lists_public_commands() {
        let message = renderer().help("chat-1").expect("render");
        assert!(message.body.contains("`/create-request` - create a support request"));
        assert!(message.body.contains("`/help`"));
        assert!(message.body.contains("eXpress"));
    }
}
