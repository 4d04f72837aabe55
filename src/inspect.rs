//! The `inspect` command: keyword scan over indexed chunks.
//!
//! A debugging aid for checking what actually landed in the store. Works on
//! the raw chunk text, not embeddings, so it needs no API key.

use anyhow::Result;

use crate::config::Config;
use crate::store;

/// Preview length in characters for each matching chunk.
const PREVIEW_CHARS: usize = 200;

pub async fn run_inspect(config: &Config, keywords: &[String]) -> Result<()> {
    let store = store::open_store(&config.store).await?;
    let total = store.count().await?;
    println!("store '{}': {} vectors", store.name(), total);

    if total == 0 {
        println!("store is empty (run `docmill index` first)");
        return Ok(());
    }

    for keyword in keywords {
        let matches = store.scan(keyword).await?;
        println!();
        println!("'{}': {} matching chunks", keyword, matches.len());
        for chunk in &matches {
            println!("  [{}] {}", chunk.metadata.source, preview(&chunk.content));
            println!("      {}", serde_json::to_string(&chunk.metadata)?);
        }
    }
    Ok(())
}

/// Truncates on a char boundary; byte slicing would panic on accented text.
fn preview(content: &str) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let truncated: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", truncated)
    }
}
