//! Chat session and message persistence.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use aera_core::{
    ChatMessage, ChatRepository, ChatRole, ChatSession, Error, NewChatMessage, Result,
};

fn session_from_row(row: &PgRow) -> ChatSession {
    ChatSession {
        id: row.get("id"),
        user_id: row.get("user_id"),
        workspace_id: row.get("workspace_id"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &PgRow) -> Result<ChatMessage> {
    let role: String = row.get("role");
    Ok(ChatMessage {
        id: row.get("id"),
        session_id: row.get("session_id"),
        role: role.parse::<ChatRole>().map_err(Error::Internal)?,
        content: row.get("content"),
        context_document_ids: row.get("context_document_ids"),
        created_at: row.get("created_at"),
    })
}

/// PostgreSQL implementation of ChatRepository.
pub struct PgChatRepository {
    pool: Pool<Postgres>,
}

impl PgChatRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn create_session(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
        title: &str,
    ) -> Result<ChatSession> {
        let row = sqlx::query(
            "INSERT INTO chat_sessions (id, user_id, workspace_id, title, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING id, user_id, workspace_id, title, created_at, updated_at",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(workspace_id)
        .bind(title)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(session_from_row(&row))
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<ChatSession>> {
        let row = sqlx::query(
            "SELECT id, user_id, workspace_id, title, created_at, updated_at
             FROM chat_sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn list_sessions(
        &self,
        user_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Vec<ChatSession>> {
        let rows = sqlx::query(
            "SELECT id, user_id, workspace_id, title, created_at, updated_at
             FROM chat_sessions
             WHERE user_id = $1 AND ($2::uuid IS NULL OR workspace_id = $2)
             ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Chat session {}", id)));
        }
        Ok(())
    }

    async fn append_message(&self, message: NewChatMessage) -> Result<ChatMessage> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO chat_messages (id, session_id, role, content, context_document_ids, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, session_id, role, content, context_document_ids, created_at",
        )
        .bind(Uuid::now_v7())
        .bind(message.session_id)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(&message.context_document_ids)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query("UPDATE chat_sessions SET updated_at = $2 WHERE id = $1")
            .bind(message.session_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        message_from_row(&row)
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, context_document_ids, created_at
             FROM chat_messages WHERE session_id = $1
             ORDER BY created_at, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(message_from_row).collect()
    }
}
