pub mod messages;
pub mod schema;
pub mod sessions;
pub mod yaml_files;

use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::{fs, path::Path, str::FromStr, time::Duration};
use tracing::info;

pub type DbPool = Pool<Sqlite>;

/// Ensure the parent directory of the database file exists.
pub fn ensure_directory_structure(database_path: &str) -> Result<()> {
    let clean_path = database_path
        .strip_prefix("sqlite:")
        .unwrap_or(database_path);
    let clean_path = clean_path.split('?').next().unwrap_or(clean_path);

    if clean_path == ":memory:" {
        return Ok(());
    }

    if let Some(parent) = Path::new(clean_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
            info!("Created directory: {}", parent.display());
        }
    }

    Ok(())
}

pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    info!("Connecting to SQLite database");

    ensure_directory_structure(database_url)?;

    let connect_opts = SqliteConnectOptions::from_str(database_url)?
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;

    schema::run_migrations(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
pub async fn create_test_pool() -> DbPool {
    let connect_opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_opts)
        .await
        .unwrap();
    schema::run_migrations(&pool).await.unwrap();
    pool
}
