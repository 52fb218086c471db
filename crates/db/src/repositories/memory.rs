use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use deskbot_core::domain::attachment::{
    disambiguate_name, sanitize_filename, AttachmentLimits, StagedAttachment, StagingUsage,
};
use deskbot_core::domain::conversation::{ConversationRef, UserId};
use deskbot_core::domain::session::DialogSession;

use super::{AttachmentStore, RepositoryError, SessionRepository};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<ConversationRef, DialogSession>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn load(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Option<DialogSession>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(conversation).cloned())
    }

    async fn save(
        &self,
        conversation: &ConversationRef,
        session: &DialogSession,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(conversation.clone(), session.clone());
        Ok(())
    }

    async fn clear(&self, conversation: &ConversationRef) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(conversation);
        Ok(())
    }
}

pub struct InMemoryAttachmentStore {
    limits: AttachmentLimits,
    files: RwLock<HashMap<UserId, BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryAttachmentStore {
    pub fn new(limits: AttachmentLimits) -> Self {
        Self { limits, files: RwLock::new(HashMap::new()) }
    }
}

impl Default for InMemoryAttachmentStore {
    fn default() -> Self {
        Self::new(AttachmentLimits::default())
    }
}

#[async_trait::async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    fn limits(&self) -> AttachmentLimits {
        self.limits
    }

    async fn add(
        &self,
        user: &UserId,
        filename: &str,
        content: &[u8],
    ) -> Result<String, RepositoryError> {
        let mut files = self.files.write().await;
        let staged = files.entry(user.clone()).or_default();
        let name =
            disambiguate_name(&sanitize_filename(filename), |name| staged.contains_key(name));
        staged.insert(name.clone(), content.to_vec());
        Ok(name)
    }

    async fn list_names(&self, user: &UserId) -> Result<Vec<String>, RepositoryError> {
        let files = self.files.read().await;
        Ok(files.get(user).map(|staged| staged.keys().cloned().collect()).unwrap_or_default())
    }

    async fn load_all(&self, user: &UserId) -> Result<Vec<StagedAttachment>, RepositoryError> {
        let files = self.files.read().await;
        Ok(files
            .get(user)
            .map(|staged| {
                staged
                    .iter()
                    .map(|(name, content)| StagedAttachment {
                        name: name.clone(),
                        content: content.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_all(&self, user: &UserId) -> Result<(), RepositoryError> {
        let mut files = self.files.write().await;
        files.remove(user);
        Ok(())
    }

    async fn usage(&self, user: &UserId) -> Result<StagingUsage, RepositoryError> {
        let files = self.files.read().await;
        Ok(files
            .get(user)
            .map(|staged| StagingUsage {
                count: staged.len(),
                total_size: staged.values().map(|content| content.len() as u64).sum(),
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use deskbot_core::domain::attachment::AttachmentLimits;
    use deskbot_core::domain::conversation::{ConversationRef, UserId};
    use deskbot_core::domain::session::DialogSession;
    use deskbot_core::domain::ticket::TicketDraft;
    use deskbot_core::flows::DialogState;

    use crate::repositories::{
        AttachmentStore, InMemoryAttachmentStore, InMemorySessionRepository, SessionRepository,
    };

    fn user(id: &str) -> UserId {
        UserId(id.to_owned())
    }

    #[tokio::test]
    async fn session_round_trip_and_clear() {
        let repo = InMemorySessionRepository::default();
        let conversation = ConversationRef::new("chat-1", user("u-1"));
        let session = DialogSession::new(DialogState::EnterDescription, TicketDraft::new("S"));

        repo.save(&conversation, &session).await.expect("save");
        assert_eq!(repo.load(&conversation).await.expect("load"), Some(session));
        assert_eq!(
            repo.state(&conversation).await.expect("state"),
            Some(DialogState::EnterDescription)
        );

        repo.clear(&conversation).await.expect("clear");
        assert_eq!(repo.state(&conversation).await.expect("state"), None);
    }

    #[tokio::test]
    async fn sessions_are_scoped_per_chat_and_user() {
        let repo = InMemorySessionRepository::default();
        let first = ConversationRef::new("chat-1", user("u-1"));
        let other_chat = ConversationRef::new("chat-2", user("u-1"));

        repo.save(&first, &DialogSession::new(DialogState::ConfirmRequest, TicketDraft::new("S")))
            .await
            .expect("save");

        assert_eq!(repo.load(&other_chat).await.expect("load"), None);
    }

    #[tokio::test]
    async fn ids_containing_colons_keep_separate_sessions() {
        let repo = InMemorySessionRepository::default();
        let first = ConversationRef::new("a:b", user("c"));
        let second = ConversationRef::new("a", user("b:c"));

        repo.save(&first, &DialogSession::new(DialogState::AddAttachment, TicketDraft::new("A")))
            .await
            .expect("save first");
        repo.save(&second, &DialogSession::new(DialogState::SelectAttribute, TicketDraft::new("B")))
            .await
            .expect("save second");

        assert_eq!(repo.state(&first).await.expect("state"), Some(DialogState::AddAttachment));
        assert_eq!(repo.state(&second).await.expect("state"), Some(DialogState::SelectAttribute));
    }

    #[tokio::test]
    async fn repeated_uploads_get_numbered_names_listed_sorted() {
        let store = InMemoryAttachmentStore::default();
        let owner = user("u-1");

        for _ in 0..3 {
            store.add(&owner, "f.txt", b"x").await.expect("add");
        }

        assert_eq!(
            store.list_names(&owner).await.expect("list"),
            vec!["f (1).txt", "f (2).txt", "f.txt"]
        );
    }

    #[tokio::test]
    async fn rejected_candidate_leaves_staging_untouched() {
        let store = InMemoryAttachmentStore::new(AttachmentLimits {
            max_count: 10,
            max_file_size: 100,
            max_total_size: 150,
        });
        let owner = user("u-1");
        store.add(&owner, "a.bin", &[0; 100]).await.expect("add");

        let before = store.list_names(&owner).await.expect("list");
        assert!(!store.is_valid(&owner, 51).await.expect("validate"));
        assert!(store.is_valid(&owner, 50).await.expect("validate"));
        assert_eq!(store.list_names(&owner).await.expect("list"), before);
    }

    #[tokio::test]
    async fn staging_is_isolated_per_user() {
        let store = InMemoryAttachmentStore::default();
        store.add(&user("u-1"), "a.txt", b"1").await.expect("add");
        store.add(&user("u-2"), "b.txt", b"2").await.expect("add");

        store.delete_all(&user("u-1")).await.expect("delete");

        assert!(store.list_names(&user("u-1")).await.expect("list").is_empty());
        assert_eq!(store.list_names(&user("u-2")).await.expect("list"), vec!["b.txt"]);
    }
}
