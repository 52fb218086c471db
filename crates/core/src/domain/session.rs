use serde::{Deserialize, Serialize};

use crate::domain::ticket::TicketDraft;
use crate::flows::states::DialogState;

/// What session storage holds for one conversation. State and draft are
/// always written together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogSession {
    pub state: DialogState,
    pub draft: TicketDraft,
}

impl DialogSession {
    pub fn new(state: DialogState, draft: TicketDraft) -> Self {
        Self { state, draft }
    }
}
