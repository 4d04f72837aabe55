//! The `index` command: corpus snapshot to embedded vectors in the store.

use anyhow::{bail, Context, Result};

use crate::chunk;
use crate::config::Config;
use crate::corpus;
use crate::embedding::{self, EmbedTask};
use crate::store;

/// Chunks the corpus, embeds each chunk, and upserts into the configured
/// store.
///
/// Skips indexing when the store already holds vectors, unless `force` is
/// set. `dry_run` stops after chunking and reports counts without touching
/// the network or the store.
pub async fn run_index(
    config: &Config,
    force: bool,
    dry_run: bool,
    batch_size: Option<usize>,
) -> Result<()> {
    let snapshot = corpus::load_snapshot(&config.source.corpus_path).with_context(|| {
        format!(
            "No corpus snapshot at {} (run `docmill extract` first)",
            config.source.corpus_path.display()
        )
    })?;

    let chunks = chunk::chunk_corpus(&snapshot, &config.chunking);
    println!("corpus: {} documents", snapshot.len());
    println!("chunks: {}", chunks.len());

    if dry_run {
        println!("dry run, not indexing");
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("embedding.provider is 'disabled'; cannot index");
    }
    if chunks.is_empty() {
        println!("nothing to index");
        return Ok(());
    }

    let store = store::open_store(&config.store).await?;
    let existing = store.count().await?;
    if existing > 0 && !force {
        println!(
            "store '{}' already holds {} vectors, skipping (use --force to re-index)",
            store.name(),
            existing
        );
        return Ok(());
    }

    let provider = embedding::create_provider(&config.embedding)?;
    println!(
        "embedding with {} ({} dims) into '{}' store",
        provider.model_name(),
        provider.dims(),
        store.name()
    );

    let batch_size = batch_size.unwrap_or(config.embedding.batch_size).max(1);
    let mut indexed = 0usize;
    let mut failed = 0usize;

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        match embedding::embed_texts(&config.embedding, &texts, EmbedTask::Document).await {
            Ok(embeddings) => {
                if embeddings.len() != batch.len() {
                    bail!(
                        "provider returned {} embeddings for {} texts",
                        embeddings.len(),
                        batch.len()
                    );
                }
                store.add(batch, &embeddings).await?;
                indexed += batch.len();
                println!("  indexed {}/{}", indexed, chunks.len());
            }
            Err(e) => {
                eprintln!("Warning: failed to embed batch: {}", e);
                failed += batch.len();
            }
        }
    }

    println!("done: {} indexed, {} failed", indexed, failed);
    if failed > 0 {
        return Err(partial_index_error(failed));
    }
    Ok(())
}

/// A partially indexed store would be silently skipped by the next plain
/// `index` run, so the error must point the operator at `--force`.
fn partial_index_error(failed: usize) -> anyhow::Error {
    anyhow::anyhow!(
        "{} chunks failed to embed; the store holds a partial index, re-run with --force to retry the full corpus",
        failed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_tells_the_operator_to_force_reindex() {
        let err = partial_index_error(3);
        let msg = err.to_string();
        assert!(msg.contains("3 chunks failed"));
        assert!(msg.contains("--force"));
    }
}
