//! Database schema migrations.
//!
//! Migrations are idempotent (CREATE TABLE IF NOT EXISTS) and run on every
//! connection, so an existing database is never disturbed and a fresh one is
//! fully initialized.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Applies the schema to the given pool.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id            TEXT PRIMARY KEY,
            source        TEXT NOT NULL,
            chunk_index   INTEGER NOT NULL,
            content       TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            hash          TEXT NOT NULL,
            UNIQUE(source, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create chunks table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id  TEXT PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create chunk_vectors table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
        .execute(pool)
        .await
        .context("Failed to create chunks source index")?;

    Ok(())
}
