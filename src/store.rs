//! Vector store backends.
//!
//! The [`VectorStore`] trait abstracts over where chunk embeddings live:
//! - **local**: SQLite database, brute-force cosine search. Fine for corpora
//!   in the tens of thousands of chunks.
//! - **pinecone**: a managed Pinecone index, reached over its REST data
//!   plane. Requires the `PINECONE_API_KEY` environment variable.
//! - **memory**: an in-process store used by tests.
//!
//! All backends are idempotent on re-index: a chunk id that already exists is
//! overwritten, never duplicated.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::RwLock;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, ChunkMetadata};

/// A chunk returned from a similarity or keyword search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name, for reporting.
    fn name(&self) -> &str;

    /// Number of vectors currently held.
    async fn count(&self) -> Result<u64>;

    /// Upserts chunks with their embeddings. `chunks` and `embeddings` must
    /// have equal length.
    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()>;

    /// Returns the `k` chunks nearest to `embedding` by cosine similarity,
    /// best first.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Case-insensitive substring scan over chunk content. Only supported by
    /// backends that hold the content locally.
    async fn scan(&self, needle: &str) -> Result<Vec<ScoredChunk>>;
}

/// Opens the store backend named in the configuration.
pub async fn open_store(config: &StoreConfig) -> Result<Box<dyn VectorStore>> {
    match config.backend.as_str() {
        "local" => Ok(Box::new(LocalStore::open(config).await?)),
        "pinecone" => Ok(Box::new(PineconeStore::new(config)?)),
        "memory" => Ok(Box::new(MemoryStore::new())),
        other => bail!("Unknown store backend: {}", other),
    }
}

// ============ Local (SQLite) ============

pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let pool = crate::db::connect(&config.path).await?;
        Ok(Self { pool })
    }

    fn row_to_scored(row: &sqlx::sqlite::SqliteRow, score: f32) -> Result<ScoredChunk> {
        let content: String = row.get("content");
        let metadata_json: String = row.get("metadata_json");
        let metadata: ChunkMetadata =
            serde_json::from_str(&metadata_json).context("Malformed chunk metadata in store")?;
        Ok(ScoredChunk {
            content,
            metadata,
            score,
        })
    }
}

#[async_trait]
impl VectorStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            bail!(
                "chunk/embedding count mismatch: {} vs {}",
                chunks.len(),
                embeddings.len()
            );
        }

        let mut tx = self.pool.begin().await?;
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source, chunk_index, content, metadata_json, hash)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    metadata_json = excluded.metadata_json,
                    hash = excluded.hash
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.metadata.source)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&metadata_json)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, embedding)
                VALUES (?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(vec_to_blob(embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        // Brute-force scan. Embeddings are small (a few KB each) so this is
        // acceptable up to tens of thousands of chunks.
        let rows = sqlx::query(
            r#"
            SELECT c.content, c.metadata_json, v.embedding
            FROM chunk_vectors v
            JOIN chunks c ON c.id = v.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(embedding, &blob_to_vec(&blob));
            scored.push(Self::row_to_scored(row, score)?);
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn scan(&self, needle: &str) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT content, metadata_json
            FROM chunks
            ORDER BY source, chunk_index
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let needle = needle.to_lowercase();
        let mut out = Vec::new();
        for row in &rows {
            let content: String = row.get("content");
            if content.to_lowercase().contains(&needle) {
                out.push(Self::row_to_scored(row, 1.0)?);
            }
        }
        Ok(out)
    }
}

// ============ Pinecone ============

/// Store backed by a Pinecone serverless index, via its REST data plane.
pub struct PineconeStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    index_name: String,
}

/// Pinecone caps upsert payloads; 100 vectors per request stays well under
/// the limit at common dimensionalities.
const PINECONE_UPSERT_BATCH: usize = 100;

impl PineconeStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY")
            .map_err(|_| anyhow::anyhow!("PINECONE_API_KEY environment variable not set"))?;
        let host = config
            .index_host
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("store.index_host required for Pinecone backend"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("https://{}", host.trim_start_matches("https://")),
            api_key,
            index_name: config.index_name.clone(),
        })
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Pinecone request failed: {}", path))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Pinecone API error {} on {}: {}", status, path, text);
        }
        Ok(response.json().await?)
    }

    fn metadata_to_pinecone(chunk: &Chunk) -> serde_json::Value {
        serde_json::json!({
            "text": chunk.content,
            "source": chunk.metadata.source,
            "titre": chunk.metadata.titre,
            "date_modification": chunk.metadata.date_modification,
            "indice_rag": chunk.metadata.indice_rag,
        })
    }

    fn match_to_scored(m: &serde_json::Value) -> ScoredChunk {
        let meta = m.get("metadata").cloned().unwrap_or_default();
        let field = |key: &str| {
            meta.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };
        ScoredChunk {
            content: field("text"),
            metadata: ChunkMetadata {
                source: field("source"),
                titre: field("titre"),
                date_modification: field("date_modification"),
                indice_rag: field("indice_rag"),
            },
            score: m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32,
        }
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn count(&self) -> Result<u64> {
        let stats = self
            .post("/describe_index_stats", &serde_json::json!({}))
            .await?;
        Ok(stats
            .get("totalVectorCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(0))
    }

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            bail!(
                "chunk/embedding count mismatch: {} vs {}",
                chunks.len(),
                embeddings.len()
            );
        }

        for (chunk_batch, embed_batch) in chunks
            .chunks(PINECONE_UPSERT_BATCH)
            .zip(embeddings.chunks(PINECONE_UPSERT_BATCH))
        {
            let vectors: Vec<serde_json::Value> = chunk_batch
                .iter()
                .zip(embed_batch.iter())
                .map(|(chunk, embedding)| {
                    serde_json::json!({
                        "id": chunk.id,
                        "values": embedding,
                        "metadata": Self::metadata_to_pinecone(chunk),
                    })
                })
                .collect();

            self.post("/vectors/upsert", &serde_json::json!({ "vectors": vectors }))
                .await?;
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let body = serde_json::json!({
            "vector": embedding,
            "topK": k,
            "includeMetadata": true,
        });
        let response = self.post("/query", &body).await?;
        let matches = response
            .get("matches")
            .and_then(|m| m.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(matches.iter().map(Self::match_to_scored).collect())
    }

    async fn scan(&self, _needle: &str) -> Result<Vec<ScoredChunk>> {
        bail!(
            "keyword scan requires the local backend (index '{}' is remote)",
            self.index_name
        )
    }
}

// ============ Memory ============

/// In-process store used by tests and as a reference implementation of the
/// trait semantics.
pub struct MemoryStore {
    entries: RwLock<Vec<(Chunk, Vec<f32>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn count(&self) -> Result<u64> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        Ok(entries.len() as u64)
    }

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            bail!(
                "chunk/embedding count mismatch: {} vs {}",
                chunks.len(),
                embeddings.len()
            );
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            entries.retain(|(c, _)| c.id != chunk.id);
            entries.push((chunk.clone(), embedding.clone()));
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        let mut scored: Vec<ScoredChunk> = entries
            .iter()
            .map(|(chunk, vec)| ScoredChunk {
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                score: cosine_similarity(embedding, vec),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn scan(&self, needle: &str) -> Result<Vec<ScoredChunk>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        let needle = needle.to_lowercase();
        Ok(entries
            .iter()
            .filter(|(chunk, _)| chunk.content.to_lowercase().contains(&needle))
            .map(|(chunk, _)| ScoredChunk {
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                score: 1.0,
            })
            .collect())
    }
}
