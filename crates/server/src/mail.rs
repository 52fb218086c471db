//! Ticket delivery to the support mailbox.
//!
//! The bot does not speak SMTP itself. A finalized ticket is composed into an
//! HTML message and posted as JSON to a mail relay, which owns the actual
//! delivery. Without a relay the [`LoggingTicketSubmitter`] records tickets in
//! the log so a local run still completes the dialog.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tera::{Context, Tera};
use tracing::{info, warn};

use deskbot_core::config::AppConfig;
use deskbot_core::domain::ticket::{SubmissionError, SubmissionRequest, TicketSubmitter};

const MAIL_BODY: &str = "mail_body.txt";
const UNKNOWN_FIELD: &str = "unknown";
const MAX_REJECTION_DETAIL: usize = 512;

#[derive(Clone, Debug)]
pub struct RelaySettings {
    pub relay_url: String,
    pub relay_token: Option<SecretString>,
    pub sender_email: String,
    pub recipient_email: String,
    pub app_name: String,
}

impl RelaySettings {
    /// `None` when no relay is configured.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        let relay_url = config.mail.relay_url.clone()?;
        Some(Self {
            relay_url,
            relay_token: config.mail.relay_token.clone(),
            sender_email: config.mail.sender_email.clone(),
            recipient_email: config.mail.recipient_email.clone(),
            app_name: config.bot.app_name.clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelayMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<RelayAttachment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelayAttachment {
    pub filename: String,
    pub content_base64: String,
}

pub struct MailRelaySubmitter {
    client: Client,
    settings: RelaySettings,
    templates: Tera,
}

impl MailRelaySubmitter {
    pub fn new(settings: RelaySettings) -> Result<Self, tera::Error> {
        let mut templates = Tera::default();
        templates
            .add_raw_template(MAIL_BODY, include_str!("../../../templates/mail_body.txt"))?;
        Ok(Self { client: Client::new(), settings, templates })
    }

    pub fn compose(&self, request: &SubmissionRequest) -> Result<RelayMessage, SubmissionError> {
        let requester = &request.requester;
        let description = tera::escape_html(&request.ticket.description)
            .replace("\r\n", "\n")
            .replace('\n', "<br>");

        let mut context = Context::new();
        context.insert("requester", &tera::escape_html(requester.display_name()));
        context.insert("user_id", &tera::escape_html(&requester.user_id.0));
        context.insert(
            "platform",
            &tera::escape_html(requester.platform.as_deref().unwrap_or(UNKNOWN_FIELD)),
        );
        context.insert("app_name", &tera::escape_html(&self.settings.app_name));
        context.insert(
            "host",
            &tera::escape_html(requester.host.as_deref().unwrap_or(UNKNOWN_FIELD)),
        );
        context.insert("description", &description);

        let body = self
            .templates
            .render(MAIL_BODY, &context)
            .map_err(|error| SubmissionError::Compose(error.to_string()))?;

        let attachments = request
            .attachments
            .iter()
            .map(|attachment| RelayAttachment {
                filename: attachment.name.clone(),
                content_base64: base64::engine::general_purpose::STANDARD
                    .encode(&attachment.content),
            })
            .collect();

        Ok(RelayMessage {
            from: self.settings.sender_email.clone(),
            to: self.settings.recipient_email.clone(),
            subject: request.ticket.subject.clone(),
            html: convert_to_html(&body),
            attachments,
        })
    }
}

#[async_trait]
impl TicketSubmitter for MailRelaySubmitter {
    async fn submit(&self, request: &SubmissionRequest) -> Result<(), SubmissionError> {
        let message = self.compose(request)?;

        let mut outgoing = self.client.post(&self.settings.relay_url).json(&message);
        if let Some(token) = &self.settings.relay_token {
            outgoing = outgoing.bearer_auth(token.expose_secret());
        }

        let response = outgoing.send().await.map_err(|error| {
            warn!(
                event_name = "egress.mail.request_failed",
                error = %error,
                "mail relay request failed"
            );
            SubmissionError::Transport(error.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut detail = response.text().await.unwrap_or_default();
            if let Some((cut, _)) = detail.char_indices().nth(MAX_REJECTION_DETAIL) {
                detail.truncate(cut);
            }
            warn!(
                event_name = "egress.mail.rejected",
                status = %status,
                "mail relay rejected ticket"
            );
            return Err(SubmissionError::Rejected { status: status.as_u16(), detail });
        }

        info!(
            event_name = "egress.mail.sent",
            subject = %message.subject,
            attachment_count = message.attachments.len(),
            "ticket handed to mail relay"
        );
        Ok(())
    }
}

/// Stand-in used when no relay is configured.
#[derive(Clone, Debug, Default)]
pub struct LoggingTicketSubmitter;

#[async_trait]
impl TicketSubmitter for LoggingTicketSubmitter {
    async fn submit(&self, request: &SubmissionRequest) -> Result<(), SubmissionError> {
        info!(
            event_name = "egress.mail.logged",
            subject = %request.ticket.subject,
            requester = %request.requester.display_name(),
            description_chars = request.ticket.description.chars().count(),
            attachment_names = ?request.ticket.attachment_names,
            "no mail relay configured; ticket written to log"
        );
        Ok(())
    }
}

/// Turns `Label: value` lines into HTML, bolding the label.
pub fn convert_to_html(text: &str) -> String {
    text.lines()
        .map(|line| match line.split_once(':') {
            Some((label, value)) => format!("<b>{label}:</b>{value}<br>"),
            None => format!("{line}<br>"),
        })
        .collect()
}
