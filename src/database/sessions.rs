use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::DbPool;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatSession {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
}

/// Session summary used by the chat-history listing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatSummary {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub last_message: String,
    pub message_count: i64,
}

impl ChatSession {
    /// Create a session, generating an id and a timestamped name when absent.
    pub async fn create(pool: &DbPool, id: Option<String>, name: Option<String>) -> Result<String> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let name = name
            .unwrap_or_else(|| format!("Chat {}", chrono::Utc::now().format("%Y-%m-%d %H:%M")));

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO chat_sessions (id, name, message_count)
            VALUES (?1, ?2, 0)
        "#,
        )
        .bind(&id)
        .bind(&name)
        .execute(pool)
        .await?;

        Ok(id)
    }

    /// Get-or-create: reuse the session when the id is known, otherwise
    /// create one (with the provided id, or a fresh one).
    pub async fn ensure(pool: &DbPool, chat_id: Option<String>) -> Result<String> {
        match chat_id {
            Some(id) => {
                if Self::get_by_id(pool, &id).await?.is_none() {
                    Self::create(pool, Some(id.clone()), None).await?;
                }
                Ok(id)
            }
            None => Self::create(pool, None, None).await,
        }
    }

    pub async fn get_by_id(pool: &DbPool, chat_id: &str) -> Result<Option<ChatSession>> {
        let session = sqlx::query_as::<_, ChatSession>(
            r#"
            SELECT id, name, created_at, updated_at, message_count
            FROM chat_sessions
            WHERE id = ?1
        "#,
        )
        .bind(chat_id)
        .fetch_optional(pool)
        .await?;

        Ok(session)
    }

    pub async fn list_all(pool: &DbPool) -> Result<Vec<ChatSession>> {
        let sessions = sqlx::query_as::<_, ChatSession>(
            r#"
            SELECT id, name, created_at, updated_at, message_count
            FROM chat_sessions
            ORDER BY updated_at DESC
        "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(sessions)
    }

    /// Session list with the latest message text folded in.
    pub async fn list_summaries(pool: &DbPool) -> Result<Vec<ChatSummary>> {
        let summaries = sqlx::query_as::<_, ChatSummary>(
            r#"
            SELECT cs.id, cs.name, cs.created_at, cs.message_count,
                   COALESCE(
                       (SELECT m.content FROM messages m
                        WHERE m.chat_id = cs.id
                        ORDER BY m.timestamp DESC, m.id DESC LIMIT 1),
                       ''
                   ) AS last_message
            FROM chat_sessions cs
            ORDER BY cs.updated_at DESC
        "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(summaries)
    }

    pub async fn delete(pool: &DbPool, chat_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?1")
            .bind(chat_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_all(pool: &DbPool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_sessions").execute(pool).await?;
        Ok(result.rows_affected())
    }
}
