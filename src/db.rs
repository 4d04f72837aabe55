//! SQLite connection management for the local vector store.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Opens (creating if necessary) the SQLite database at `path` and runs
/// migrations.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .with_context(|| format!("Invalid database path: {}", path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", path.display()))?;

    crate::migrate::run(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_creates_database_and_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/store.sqlite");
        let pool = connect(&path).await.unwrap();
        assert!(path.exists());

        // Schema must exist and be queryable.
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store.sqlite");
        drop(connect(&path).await.unwrap());
        connect(&path).await.unwrap();
    }
}
