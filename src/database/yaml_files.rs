use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;

/// A generated document owned by a chat session. The default flow uses two
/// canonical names, `agents.yaml` and `workflow.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct YamlFile {
    pub name: String,
    pub content: String,
}

impl YamlFile {
    pub async fn upsert(pool: &DbPool, chat_id: &str, name: &str, content: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO yaml_files (chat_id, file_name, content, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT (chat_id, file_name)
            DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at
        "#,
        )
        .bind(chat_id)
        .bind(name)
        .bind(content)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Store several documents for one chat session.
    pub async fn upsert_many(pool: &DbPool, chat_id: &str, files: &[YamlFile]) -> Result<()> {
        for file in files {
            Self::upsert(pool, chat_id, &file.name, &file.content).await?;
        }
        Ok(())
    }

    pub async fn list(pool: &DbPool, chat_id: &str) -> Result<Vec<YamlFile>> {
        let files = sqlx::query_as::<_, YamlFile>(
            r#"
            SELECT file_name AS name, content
            FROM yaml_files
            WHERE chat_id = ?1
            ORDER BY file_name ASC
        "#,
        )
        .bind(chat_id)
        .fetch_all(pool)
        .await?;

        Ok(files)
    }

    pub async fn get(pool: &DbPool, chat_id: &str, name: &str) -> Result<Option<YamlFile>> {
        let file = sqlx::query_as::<_, YamlFile>(
            r#"
            SELECT file_name AS name, content
            FROM yaml_files
            WHERE chat_id = ?1 AND file_name = ?2
        "#,
        )
        .bind(chat_id)
        .bind(name)
        .fetch_optional(pool)
        .await?;

        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{create_test_pool, sessions::ChatSession};

    #[tokio::test]
    async fn upsert_replaces_existing_content() {
        let pool = create_test_pool().await;
        let id = ChatSession::create(&pool, None, None).await.unwrap();

        YamlFile::upsert(&pool, &id, "agents.yaml", "v: 1").await.unwrap();
        YamlFile::upsert(&pool, &id, "agents.yaml", "v: 2").await.unwrap();

        let files = YamlFile::list(&pool, &id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, "v: 2");
    }

    #[tokio::test]
    async fn list_orders_by_name() {
        let pool = create_test_pool().await;
        let id = ChatSession::create(&pool, None, None).await.unwrap();

        YamlFile::upsert(&pool, &id, "workflow.yaml", "w").await.unwrap();
        YamlFile::upsert(&pool, &id, "agents.yaml", "a").await.unwrap();

        let files = YamlFile::list(&pool, &id).await.unwrap();
        assert_eq!(files[0].name, "agents.yaml");
        assert_eq!(files[1].name, "workflow.yaml");
    }
}
