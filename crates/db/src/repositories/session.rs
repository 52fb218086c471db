use chrono::Utc;
use sqlx::Row;

use deskbot_core::domain::conversation::ConversationRef;
use deskbot_core::domain::session::DialogSession;
use deskbot_core::domain::ticket::TicketDraft;
use deskbot_core::flows::DialogState;

use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<DialogSession, RepositoryError> {
    let state: String = row.try_get("state").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let draft_json: String =
        row.try_get("draft_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let state =
        state.parse::<DialogState>().map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let draft = serde_json::from_str::<TicketDraft>(&draft_json)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(DialogSession { state, draft })
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn load(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Option<DialogSession>, RepositoryError> {
        let row = sqlx::query(
            "SELECT state, draft_json FROM dialog_sessions WHERE chat_id = ? AND user_id = ?",
        )
        .bind(&conversation.chat_id)
        .bind(&conversation.user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_session(r)?)),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        conversation: &ConversationRef,
        session: &DialogSession,
    ) -> Result<(), RepositoryError> {
        let draft_json = serde_json::to_string(&session.draft)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO dialog_sessions (chat_id, user_id, state, draft_json, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(chat_id, user_id) DO UPDATE SET
                 state = excluded.state,
                 draft_json = excluded.draft_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&conversation.chat_id)
        .bind(&conversation.user_id.0)
        .bind(session.state.as_str())
        .bind(draft_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, conversation: &ConversationRef) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM dialog_sessions WHERE chat_id = ? AND user_id = ?")
            .bind(&conversation.chat_id)
            .bind(&conversation.user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
