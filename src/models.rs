//! Core data models used throughout docmill.
//!
//! These types represent the documents, chunks, and citations that flow
//! through the extraction, chunking, and retrieval pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sparse document properties read from `docProps/core.xml`.
///
/// A field is present only when the source property was non-empty; empty or
/// missing properties are omitted from the serialized corpus entirely. The
/// three date fields (`created`, `modified`, `last_printed`) hold ISO-8601
/// strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_printed: Option<String>,
}

/// Body content of an extracted document.
///
/// Invariant: `paragraphs` never contains an empty or whitespace-only entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentContent {
    pub paragraphs: Vec<String>,
}

/// One successfully extracted document, as persisted in the corpus snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub metadata: DocMetadata,
    pub content: DocumentContent,
    /// Optional relevance index assigned by a downstream curation step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indice_rag: Option<String>,
}

/// The persisted aggregation of all extracted documents, keyed by filename.
///
/// `BTreeMap` keeps iteration (and therefore chunk ordering) deterministic
/// regardless of directory listing order.
pub type CorpusSnapshot = BTreeMap<String, DocumentRecord>;

/// Dense metadata projection attached to every chunk of a document.
///
/// Unlike [`DocMetadata`], every field is always present; missing source
/// values become empty strings. Field names follow the client-facing wire
/// schema consumed by the chat frontend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Corpus key of the parent document (its filename).
    pub source: String,
    /// Document title, or `""` when the property was unset.
    pub titre: String,
    /// ISO-8601 modification date, or `""` when unknown.
    pub date_modification: String,
    /// Relevance index, or `""` when unset.
    pub indice_rag: String,
}

/// A bounded-length slice of a document's full text, used as the unit of
/// embedding and retrieval. All chunks of the same document share the same
/// metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic ID derived from the source filename and chunk index.
    pub id: String,
    /// Zero-based position of this chunk within its document.
    pub chunk_index: i64,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// SHA-256 of `content`, used for staleness detection.
    pub hash: String,
}

/// A source citation attached to a chat answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub fichier: String,
    pub titre: String,
    pub date_modification: String,
}

impl Citation {
    pub fn from_metadata(meta: &ChunkMetadata) -> Self {
        Self {
            fichier: meta.source.clone(),
            titre: meta.titre.clone(),
            date_modification: meta.date_modification.clone(),
        }
    }
}
