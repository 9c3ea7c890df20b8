use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{debug, info};

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations");

    create_chat_sessions_table(pool).await?;
    create_messages_table(pool).await?;
    create_yaml_files_table(pool).await?;
    create_indexes(pool).await?;

    info!("Database migrations completed successfully");
    Ok(())
}

async fn create_chat_sessions_table(pool: &SqlitePool) -> Result<()> {
    debug!("Creating chat_sessions table");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_sessions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            message_count INTEGER NOT NULL DEFAULT 0
        )
    "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_messages_table(pool: &SqlitePool) -> Result<()> {
    debug!("Creating messages table");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            timestamp TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (chat_id) REFERENCES chat_sessions(id) ON DELETE CASCADE
        )
    "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_yaml_files_table(pool: &SqlitePool) -> Result<()> {
    debug!("Creating yaml_files table");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS yaml_files (
            chat_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            content TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (chat_id, file_name),
            FOREIGN KEY (chat_id) REFERENCES chat_sessions(id) ON DELETE CASCADE
        )
    "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON messages (chat_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages (timestamp)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_yaml_files_chat_id ON yaml_files (chat_id)")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_database_info(pool: &SqlitePool) -> Result<String> {
    let row = sqlx::query("SELECT sqlite_version() AS version")
        .fetch_one(pool)
        .await?;
    Ok(row.get::<String, _>("version"))
}
