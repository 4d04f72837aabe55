//! Corpus aggregation: extract every `.docx` in a directory into a single
//! persisted snapshot.
//!
//! The snapshot is the only hand-off between the extraction run and the
//! indexing run; the two never share in-memory state. It is written as
//! pretty-printed UTF-8 JSON (4-space indent, non-ASCII kept verbatim) via a
//! temp file and rename, so a failed write never leaves a partial corpus.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::config::Config;
use crate::extract;
use crate::models::CorpusSnapshot;

/// Runs one aggregation pass: scan, extract, persist, summarize.
pub fn run_extract(config: &Config) -> Result<()> {
    let dir = &config.source.dir;
    println!("extracting .docx files from {}", dir.display());

    let snapshot = build_snapshot(dir)?;
    save_snapshot(&snapshot, &config.source.corpus_path)?;

    println!("corpus written to {}", config.source.corpus_path.display());
    println!("  documents: {}", snapshot.len());
    let paragraphs: usize = snapshot
        .values()
        .map(|r| r.content.paragraphs.len())
        .sum();
    println!("  paragraphs: {}", paragraphs);
    println!("ok");
    Ok(())
}

/// Extracts every `.docx` file in `dir` (non-recursive). Files that fail
/// extraction are reported on stderr and excluded; they never appear in the
/// snapshot as error entries.
pub fn build_snapshot(dir: &Path) -> Result<CorpusSnapshot> {
    if !dir.is_dir() {
        bail!("source directory does not exist: {}", dir.display());
    }

    let mut filenames: Vec<String> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".docx"))
        .collect();
    // Directory listing order is platform-dependent; sort for determinism.
    filenames.sort();

    let mut snapshot = CorpusSnapshot::new();
    for filename in filenames {
        let path = dir.join(&filename);
        match extract::extract_document(&path) {
            Ok(record) => {
                println!(
                    "  {} ({} paragraphs)",
                    filename,
                    record.content.paragraphs.len()
                );
                snapshot.insert(filename, record);
            }
            Err(e) => {
                eprintln!("Warning: skipping {}: {}", filename, e);
            }
        }
    }
    Ok(snapshot)
}

/// Persists the snapshot as pretty JSON with 4-space indentation, atomically.
pub fn save_snapshot(snapshot: &CorpusSnapshot, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    snapshot
        .serialize(&mut serializer)
        .context("Failed to serialize corpus snapshot")?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &buf)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move corpus into place at {}", path.display()))?;
    Ok(())
}

/// Loads a snapshot back from disk. A malformed file is a fatal error: it
/// means the pipeline was wired to the wrong input, not a transient failure.
pub fn load_snapshot(path: &Path) -> Result<CorpusSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus snapshot: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Malformed corpus snapshot: {}", path.display()))
}
