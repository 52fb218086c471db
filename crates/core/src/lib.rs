pub mod audit;
pub mod config;
pub mod domain;
pub mod flows;

pub use domain::attachment::{AttachmentLimits, StagedAttachment, StagingUsage};
pub use domain::conversation::{ConversationRef, Requester, UserId};
pub use domain::session::DialogSession;
pub use domain::ticket::{
    SubmissionError, SubmissionRequest, TicketDraft, TicketError, TicketSubmitter, TicketToSend,
};
pub use flows::{DialogCommand, DialogEngine, DialogState, FlowEvent, Prompt};
