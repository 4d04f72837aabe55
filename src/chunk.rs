//! Recursive character text splitter and corpus chunking.
//!
//! [`TextSplitter`] splits text into chunks of at most `chunk_size`
//! characters with `chunk_overlap` characters of trailing context repeated
//! at the start of the next chunk. Splitting tries separators in priority
//! order (paragraph break, line break, space, single characters) and uses
//! the coarsest one that appears in the text, recursing to finer separators
//! for pieces that are still too large.
//!
//! [`chunk_corpus`] applies the splitter to every document of a corpus
//! snapshot, attaching the per-document metadata projection to each chunk.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::models::{Chunk, ChunkMetadata, CorpusSnapshot};

/// Separator priority: paragraph break, line break, word boundary, character.
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Character-based recursive splitter. Sizes and overlap are measured in
/// Unicode scalar values, not bytes.
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Splits `text` into trimmed, non-empty chunks. Deterministic: the same
    /// input and parameters always produce the same sequence.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // Pick the coarsest separator that occurs in the text; "" always
        // matches and falls back to per-character splitting.
        let mut separator = separators.last().cloned().unwrap_or_default();
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() || text.contains(sep.as_str()) {
                separator = sep.clone();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(|c| c.to_string()).collect()
        } else {
            text.split(separator.as_str()).map(str::to_string).collect()
        };

        let mut final_chunks = Vec::new();
        let mut good_splits: Vec<String> = Vec::new();
        for piece in splits {
            if char_len(&piece) < self.chunk_size {
                good_splits.push(piece);
            } else {
                if !good_splits.is_empty() {
                    final_chunks.extend(self.merge_splits(&good_splits, &separator));
                    good_splits.clear();
                }
                if remaining.is_empty() {
                    final_chunks.push(piece);
                } else {
                    final_chunks.extend(self.split_recursive(&piece, remaining));
                }
            }
        }
        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits, &separator));
        }
        final_chunks
    }

    /// Greedily packs splits into chunks of at most `chunk_size` characters,
    /// then slides the window back so at most `chunk_overlap` characters of
    /// the previous chunk are carried into the next one.
    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let len = char_len(piece);
            if total + len + if current.is_empty() { 0 } else { sep_len } > self.chunk_size
                && !current.is_empty()
            {
                if let Some(doc) = join_trimmed(&current, separator) {
                    docs.push(doc);
                }
                // Drop leading pieces until the retained tail fits within the
                // overlap budget and leaves room for the incoming piece.
                while total > self.chunk_overlap
                    || (total + len + if current.is_empty() { 0 } else { sep_len }
                        > self.chunk_size
                        && total > 0)
                {
                    let first_len = char_len(current[0]);
                    total -= first_len + if current.len() > 1 { sep_len } else { 0 };
                    current.pop_front();
                }
            }
            current.push_back(piece);
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }

        if let Some(doc) = join_trimmed(&current, separator) {
            docs.push(doc);
        }
        docs
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join_trimmed(pieces: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = pieces
        .iter()
        .copied()
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Turns a corpus snapshot into the flat, ordered chunk sequence handed to
/// the embedding adapter.
///
/// Per document: paragraphs are joined with a single `\n`, the metadata
/// projection is built (every field present, empty string when the source
/// value is absent), and the splitter runs over the full text. A document
/// with no text yields zero chunks. Document order follows the snapshot's
/// key order; chunk order within a document is left to right.
pub fn chunk_corpus(snapshot: &CorpusSnapshot, config: &ChunkingConfig) -> Vec<Chunk> {
    let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap);
    let mut chunks = Vec::new();
    for (filename, record) in snapshot {
        let full_text = record.content.paragraphs.join("\n");
        let metadata = ChunkMetadata {
            source: filename.clone(),
            titre: record.metadata.title.clone().unwrap_or_default(),
            date_modification: record.metadata.modified.clone().unwrap_or_default(),
            indice_rag: record.indice_rag.clone().unwrap_or_default(),
        };
        for (i, content) in splitter.split_text(&full_text).into_iter().enumerate() {
            chunks.push(make_chunk(filename, i as i64, content, metadata.clone()));
        }
    }
    chunks
}

fn make_chunk(source: &str, index: i64, content: String, metadata: ChunkMetadata) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    // Stable across runs so re-indexing upserts instead of duplicating.
    let mut id_hasher = Sha256::new();
    id_hasher.update(source.as_bytes());
    id_hasher.update(b"#");
    id_hasher.update(index.to_le_bytes());
    let id = format!("{:x}", id_hasher.finalize());

    Chunk {
        id,
        chunk_index: index,
        content,
        metadata,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocMetadata, DocumentContent, DocumentRecord};

    fn record(paragraphs: &[&str], title: Option<&str>) -> DocumentRecord {
        DocumentRecord {
            metadata: DocMetadata {
                title: title.map(str::to_string),
                ..Default::default()
            },
            content: DocumentContent {
                paragraphs: paragraphs.iter().map(|p| p.to_string()).collect(),
            },
            indice_rag: None,
        }
    }

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Largest suffix of `a` that is a prefix of `b`, in characters.
    fn shared_boundary(a: &str, b: &str) -> usize {
        let a_chars: Vec<char> = a.chars().collect();
        let b_chars: Vec<char> = b.chars().collect();
        let max = a_chars.len().min(b_chars.len());
        for k in (1..=max).rev() {
            if a_chars[a_chars.len() - k..] == b_chars[..k] {
                return k;
            }
        }
        0
    }

    #[test]
    fn short_document_yields_single_full_text_chunk() {
        let mut snapshot = CorpusSnapshot::new();
        snapshot.insert(
            "doc1.docx".to_string(),
            record(&["Hello world.", "Second line."], Some("T")),
        );
        let chunks = chunk_corpus(&snapshot, &config(600, 150));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Hello world.\nSecond line.");
        assert_eq!(chunks[0].metadata.source, "doc1.docx");
        assert_eq!(chunks[0].metadata.titre, "T");
        assert_eq!(chunks[0].metadata.date_modification, "");
        assert_eq!(chunks[0].metadata.indice_rag, "");
    }

    #[test]
    fn empty_document_yields_zero_chunks() {
        let mut snapshot = CorpusSnapshot::new();
        snapshot.insert("empty.docx".to_string(), record(&[], None));
        let chunks = chunk_corpus(&snapshot, &config(600, 150));
        assert!(chunks.is_empty());
    }

    #[test]
    fn text_exactly_chunk_size_is_one_chunk() {
        let splitter = TextSplitter::new(600, 150);
        let text = "a".repeat(600);
        let chunks = splitter.split_text(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn long_text_produces_three_overlapping_chunks() {
        // 280 five-char words minus the final space: 1399 characters.
        let text = (0..280)
            .map(|i| format!("w{:03}", i))
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(text.chars().count(), 1399);

        let splitter = TextSplitter::new(600, 150);
        let chunks = splitter.split_text(&text);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 600, "chunk too long: {}", chunk.len());
        }
        for pair in chunks.windows(2) {
            let overlap = shared_boundary(&pair[0], &pair[1]);
            assert!(overlap >= 100, "expected ~150 chars of overlap, got {}", overlap);
            assert!(overlap <= 150);
        }
    }

    #[test]
    fn paragraph_boundaries_are_preferred() {
        let para = "x".repeat(300);
        let text = format!("{}\n\n{}", para, para);
        let splitter = TextSplitter::new(400, 50);
        let chunks = splitter.split_text(&text);
        // Each paragraph fits on its own, so the split lands on the blank line.
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], para);
        assert_eq!(chunks[1], para);
    }

    #[test]
    fn unsplittable_run_falls_back_to_characters() {
        let text = "y".repeat(1000);
        let splitter = TextSplitter::new(400, 100);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 400);
        }
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert!(total >= 1000);
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = (0..200)
            .map(|i| format!("phrase numéro {}.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let splitter = TextSplitter::new(600, 150);
        assert_eq!(splitter.split_text(&text), splitter.split_text(&text));
    }

    #[test]
    fn chunk_sizes_measured_in_characters_not_bytes() {
        // 'é' is two bytes; 300 of them fit in one 300-char chunk.
        let text = "é".repeat(300);
        let splitter = TextSplitter::new(300, 50);
        let chunks = splitter.split_text(&text);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn chunks_preserve_document_and_position_order() {
        let long_para = (0..200)
            .map(|i| format!("mot{:03}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let mut snapshot = CorpusSnapshot::new();
        snapshot.insert("a.docx".to_string(), record(&[&long_para], Some("A")));
        snapshot.insert("b.docx".to_string(), record(&["court"], Some("B")));
        let chunks = chunk_corpus(&snapshot, &config(600, 150));

        let a_count = chunks.iter().filter(|c| c.metadata.source == "a.docx").count();
        assert!(a_count > 1);
        // All chunks of a.docx come first, with ascending indices.
        for (i, chunk) in chunks.iter().enumerate().take(a_count) {
            assert_eq!(chunk.metadata.source, "a.docx");
            assert_eq!(chunk.chunk_index, i as i64);
        }
        assert_eq!(chunks.last().unwrap().metadata.source, "b.docx");
        assert_eq!(chunks.last().unwrap().chunk_index, 0);
    }

    #[test]
    fn chunk_ids_are_deterministic() {
        let mut snapshot = CorpusSnapshot::new();
        snapshot.insert("doc.docx".to_string(), record(&["Bonjour."], None));
        let first = chunk_corpus(&snapshot, &config(600, 150));
        let second = chunk_corpus(&snapshot, &config(600, 150));
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].hash, second[0].hash);
    }
}
