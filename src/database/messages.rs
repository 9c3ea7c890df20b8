use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub chat_id: String,
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

impl Message {
    /// Append a message and bump the session's counters.
    pub async fn add(pool: &DbPool, chat_id: &str, role: &str, content: &str) -> Result<i64> {
        let mut tx = pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO messages (chat_id, role, content)
            VALUES (?1, ?2, ?3)
        "#,
        )
        .bind(chat_id)
        .bind(role)
        .bind(content)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE chat_sessions
            SET message_count = message_count + 1, updated_at = datetime('now')
            WHERE id = ?1
        "#,
        )
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list(pool: &DbPool, chat_id: &str, limit: Option<i64>) -> Result<Vec<Message>> {
        let messages = match limit {
            Some(limit) => {
                sqlx::query_as::<_, Message>(
                    r#"
                    SELECT id, chat_id, role, content, timestamp
                    FROM messages
                    WHERE chat_id = ?1
                    ORDER BY timestamp ASC, id ASC
                    LIMIT ?2
                "#,
                )
                .bind(chat_id)
                .bind(limit)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Message>(
                    r#"
                    SELECT id, chat_id, role, content, timestamp
                    FROM messages
                    WHERE chat_id = ?1
                    ORDER BY timestamp ASC, id ASC
                "#,
                )
                .bind(chat_id)
                .fetch_all(pool)
                .await?
            }
        };

        Ok(messages)
    }
}
