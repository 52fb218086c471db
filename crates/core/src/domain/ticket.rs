use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::attachment::StagedAttachment;
use crate::domain::conversation::Requester;

/// Support request as it evolves through the dialog. Optional fields are
/// filled in state by state; `TicketToSend` is the finalized shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDraft {
    pub subject: String,
    pub description: Option<String>,
    #[serde(default)]
    pub attachment_names: Vec<String>,
}

impl TicketDraft {
    pub fn new(subject: impl Into<String>) -> Self {
        Self { subject: subject.into(), description: None, attachment_names: Vec::new() }
    }

    pub fn finalize(&self) -> Result<TicketToSend, TicketError> {
        TicketToSend::try_from(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketToSend {
    pub subject: String,
    pub description: String,
    pub attachment_names: Vec<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("ticket field `{0}` is required before submission")]
    MissingField(&'static str),
}

impl TryFrom<&TicketDraft> for TicketToSend {
    type Error = TicketError;

    fn try_from(draft: &TicketDraft) -> Result<Self, Self::Error> {
        if draft.subject.trim().is_empty() {
            return Err(TicketError::MissingField("subject"));
        }
        let description = draft
            .description
            .clone()
            .filter(|description| !description.is_empty())
            .ok_or(TicketError::MissingField("description"))?;

        Ok(Self {
            subject: draft.subject.clone(),
            description,
            attachment_names: draft.attachment_names.clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub ticket: TicketToSend,
    pub requester: Requester,
    pub attachments: Vec<StagedAttachment>,
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("submission transport failed: {0}")]
    Transport(String),
    #[error("submission rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("submission could not be composed: {0}")]
    Compose(String),
}

/// Hands a finalized ticket to the support desk.
#[async_trait]
pub trait TicketSubmitter: Send + Sync {
    async fn submit(&self, request: &SubmissionRequest) -> Result<(), SubmissionError>;
}

#[cfg(test)]
mod tests {
    use super::{TicketDraft, TicketError, TicketToSend};

    #[test]
    fn finalize_carries_fields_verbatim() {
        let draft = TicketDraft {
            subject: "Support request".to_owned(),
            description: Some("Printer is\njammed".to_owned()),
            attachment_names: vec!["b.png".to_owned(), "a.png".to_owned()],
        };

        let ticket = draft.finalize().expect("complete draft");

        assert_eq!(
            ticket,
            TicketToSend {
                subject: "Support request".to_owned(),
                description: "Printer is\njammed".to_owned(),
                attachment_names: vec!["b.png".to_owned(), "a.png".to_owned()],
            }
        );
    }

    #[test]
    fn finalize_rejects_missing_description() {
        let draft = TicketDraft::new("Support request");
        assert_eq!(draft.finalize(), Err(TicketError::MissingField("description")));
    }

    #[test]
    fn finalize_rejects_blank_subject() {
        let draft = TicketDraft {
            subject: "  ".to_owned(),
            description: Some("D".to_owned()),
            attachment_names: Vec::new(),
        };
        assert_eq!(draft.finalize(), Err(TicketError::MissingField("subject")));
    }

    #[test]
    fn draft_deserializes_without_attachment_names() {
        let draft: TicketDraft =
            serde_json::from_str(r#"{"subject":"S","description":null}"#).expect("decode");
        assert!(draft.attachment_names.is_empty());
    }
}
