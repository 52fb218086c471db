use thiserror::Error;

use deskbot_core::domain::ticket::{SubmissionError, TicketError};
use deskbot_core::flows::FlowTransitionError;
use deskbot_db::RepositoryError;

use crate::replies::{RenderError, SOMETHING_WENT_WRONG_MESSAGE};

pub const SUBMISSION_FAILED_MESSAGE: &str =
    "The request could not be delivered to technical support. Please try again later.";

/// Failure while handling one inbound event. Never fatal to the process.
#[derive(Debug, Error)]
pub enum DialogError {
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
    #[error(transparent)]
    Ticket(#[from] TicketError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl DialogError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Submission(_) => SUBMISSION_FAILED_MESSAGE,
            Self::Flow(_) | Self::Ticket(_) | Self::Repository(_) | Self::Render(_) => {
                SOMETHING_WENT_WRONG_MESSAGE
            }
        }
    }

    /// Whether the user can resend the same input and expect it to work.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Repository(_) | Self::Submission(_))
    }
}
