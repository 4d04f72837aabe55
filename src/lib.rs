//! docmill: a local-first document question-answering pipeline.
//!
//! Turns a folder of `.docx` files into an embedded, searchable knowledge
//! base and answers questions about it over a chat API:
//!
//! ```text
//! .docx files ──extract──▶ corpus.json ──chunk──▶ chunks
//!                                                   │
//!                                                embed
//!                                                   ▼
//!      chat / serve ◀──retrieve+generate──── vector store
//! ```
//!
//! The stages are decoupled: `extract` persists a corpus snapshot, `index`
//! chunks and embeds it into the configured store (local SQLite or a managed
//! Pinecone index), and `chat`/`serve` answer questions against the store
//! with an LLM.

pub mod chat;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod index_cmd;
pub mod inspect;
pub mod migrate;
pub mod models;
pub mod rag;
pub mod server;
pub mod store;
