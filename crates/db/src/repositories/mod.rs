use async_trait::async_trait;
use thiserror::Error;

use deskbot_core::domain::attachment::{AttachmentLimits, StagedAttachment, StagingUsage};
use deskbot_core::domain::conversation::{ConversationRef, UserId};
use deskbot_core::domain::session::DialogSession;
use deskbot_core::flows::DialogState;

pub mod attachments;
pub mod memory;
pub mod session;

pub use attachments::FsAttachmentStore;
pub use memory::{InMemoryAttachmentStore, InMemorySessionRepository};
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("attachment storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Per-conversation dialog state and draft.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn load(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Option<DialogSession>, RepositoryError>;

    /// Writes state and draft in one step, replacing whatever was stored.
    async fn save(
        &self,
        conversation: &ConversationRef,
        session: &DialogSession,
    ) -> Result<(), RepositoryError>;

    async fn clear(&self, conversation: &ConversationRef) -> Result<(), RepositoryError>;

    async fn state(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Option<DialogState>, RepositoryError> {
        Ok(self.load(conversation).await?.map(|session| session.state))
    }
}

/// Per-user staging area for files waiting to be submitted with a ticket.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    fn limits(&self) -> AttachmentLimits;

    /// Stores the file and returns the name it was stored under, which differs
    /// from `filename` after sanitizing or on a collision.
    async fn add(
        &self,
        user: &UserId,
        filename: &str,
        content: &[u8],
    ) -> Result<String, RepositoryError>;

    /// Staged names in lexicographic order.
    async fn list_names(&self, user: &UserId) -> Result<Vec<String>, RepositoryError>;

    async fn load_all(&self, user: &UserId) -> Result<Vec<StagedAttachment>, RepositoryError>;

    async fn delete_all(&self, user: &UserId) -> Result<(), RepositoryError>;

    async fn usage(&self, user: &UserId) -> Result<StagingUsage, RepositoryError>;

    async fn is_valid(&self, user: &UserId, candidate_size: u64) -> Result<bool, RepositoryError> {
        let usage = self.usage(user).await?;
        Ok(self.limits().accepts(usage, candidate_size))
    }
}
