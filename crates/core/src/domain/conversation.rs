use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key for per-conversation dialog state: one sender inside one chat.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationRef {
    pub chat_id: String,
    pub user_id: UserId,
}

impl ConversationRef {
    pub fn new(chat_id: impl Into<String>, user_id: UserId) -> Self {
        Self { chat_id: chat_id.into(), user_id }
    }

    /// Flat key for stores that index by string. The chat id is
    /// length-prefixed so no pair of ids can produce another pair's key.
    pub fn storage_key(&self) -> String {
        format!("{}:{}:{}", self.chat_id.len(), self.chat_id, self.user_id.0)
    }
}

impl fmt::Display for ConversationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.user_id.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: UserId,
    pub username: Option<String>,
    pub platform: Option<String>,
    pub host: Option<String>,
}

impl Requester {
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.user_id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationRef, Requester, UserId};

    #[test]
    fn storage_key_prefixes_chat_length() {
        let conversation = ConversationRef::new("chat-1", UserId("user-7".to_owned()));
        assert_eq!(conversation.storage_key(), "6:chat-1:user-7");
        assert_eq!(conversation.to_string(), "chat-1/user-7");
    }

    #[test]
    fn separator_in_ids_does_not_merge_conversations() {
        let first = ConversationRef::new("a:b", UserId("c".to_owned()));
        let second = ConversationRef::new("a", UserId("b:c".to_owned()));

        assert_ne!(first, second);
        assert_ne!(first.storage_key(), second.storage_key());
    }

    #[test]
    fn requester_falls_back_to_user_id_for_display_name() {
        let requester = Requester {
            user_id: UserId("user-7".to_owned()),
            username: None,
            platform: None,
            host: None,
        };
        assert_eq!(requester.display_name(), "user-7");
    }
}
