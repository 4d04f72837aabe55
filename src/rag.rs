//! Retrieval-augmented chat engine.
//!
//! A question goes through four stages: embed the query, retrieve the
//! nearest chunks from the vector store, assemble the prompt from the
//! configured template, and generate an answer with the LLM. The engine
//! keeps a bounded conversation memory so follow-up questions can refer to
//! earlier turns.
//!
//! All three collaborators (embedder, store, LLM) are trait objects handed
//! to [`ChatEngine::new`], so tests can drive the engine end to end with
//! in-process doubles.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::models::Citation;
use crate::store::VectorStore;

/// One completed question/answer exchange.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// An answer with the documents it was grounded on. Field names match the
/// HTTP wire format.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatAnswer {
    pub reponse: String,
    pub sources: Vec<Citation>,
}

/// Text generation abstraction, so the engine can be tested without network
/// access.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// LLM client for the Google Generative Language API.
///
/// Requires the `GOOGLE_API_KEY` environment variable.
pub struct GeminiClient {
    client: reqwest::Client,
    model: String,
    api_key: String,
    temperature: f64,
    max_output_tokens: u32,
    top_p: f64,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        if config.llm.provider != "gemini" {
            bail!("Unknown LLM provider: {}", config.llm.provider);
        }
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| anyhow::anyhow!("GOOGLE_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            model: config.llm.model.clone(),
            api_key,
            temperature: config.llm.temperature,
            max_output_tokens: config.llm.max_output_tokens,
            top_p: config.llm.top_p,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [ { "parts": [ { "text": prompt } ] } ],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
                "topP": self.top_p,
            }
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow::anyhow!("Gemini returned no text candidate"))?;
        Ok(text.to_string())
    }
}

/// Builds the LLM client named in the configuration.
pub fn create_llm(config: &Config) -> Result<Box<dyn LlmClient>> {
    match config.llm.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiClient::new(config)?)),
        other => bail!("Unknown LLM provider: {}", other),
    }
}

pub struct ChatEngine {
    config: Config,
    embedder: Box<dyn Embedder>,
    store: Box<dyn VectorStore>,
    llm: Box<dyn LlmClient>,
    history: Vec<ChatTurn>,
}

impl ChatEngine {
    pub fn new(
        config: Config,
        embedder: Box<dyn Embedder>,
        store: Box<dyn VectorStore>,
        llm: Box<dyn LlmClient>,
    ) -> Self {
        Self {
            config,
            embedder,
            store,
            llm,
            history: Vec::new(),
        }
    }

    /// Answers one question: retrieve, prompt, generate, remember.
    pub async fn ask(&mut self, question: &str) -> Result<ChatAnswer> {
        let query_vec = self.embedder.embed_query(question).await?;
        let retrieved = self
            .store
            .query(&query_vec, self.config.retrieval.top_k)
            .await?;

        let context = retrieved
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = self
            .config
            .system_prompt
            .replace("{chat_history}", &format_history(&self.history))
            .replace("{context}", &context)
            .replace("{question}", question);

        let answer = self.llm.generate(&prompt).await?;

        // One citation per document, first occurrence wins, retrieval order
        // preserved.
        let mut sources: Vec<Citation> = Vec::new();
        for chunk in &retrieved {
            if !sources.iter().any(|c| c.fichier == chunk.metadata.source) {
                sources.push(Citation::from_metadata(&chunk.metadata));
            }
        }

        self.history.push(ChatTurn {
            question: question.to_string(),
            answer: answer.clone(),
        });
        let limit = self.config.retrieval.history_limit;
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }

        Ok(ChatAnswer {
            reponse: answer,
            sources,
        })
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }
}

fn format_history(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("Humain : {}\nAssistant : {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::ApiEmbedder;
    use crate::models::{Chunk, ChunkMetadata};
    use crate::store::MemoryStore;
    use std::sync::Mutex;

    struct EchoLlm {
        prompts: std::sync::Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("réponse générée".to_string())
        }
    }

    /// Embeds every query as the same fixed vector, so retrieval order is
    /// fully determined by what was seeded into the store.
    struct FixedEmbedder {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.vector.clone())
        }
    }

    fn test_config() -> Config {
        let raw = r#"
[source]
dir = "./docs"
corpus_path = "./corpus.json"
"#;
        toml::from_str(raw).unwrap()
    }

    fn chunk(source: &str, index: i64, content: &str) -> Chunk {
        Chunk {
            id: format!("{}#{}", source, index),
            chunk_index: index,
            content: content.to_string(),
            metadata: ChunkMetadata {
                source: source.to_string(),
                titre: format!("Titre {}", source),
                date_modification: "2024-05-01T00:00:00+00:00".to_string(),
                indice_rag: String::new(),
            },
            hash: "h".to_string(),
        }
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        // Two chunks of rapport.docx rank above notes.docx for the query
        // vector [1, 0].
        let chunks = vec![
            chunk("rapport.docx", 0, "les ventes ont augmenté"),
            chunk("rapport.docx", 1, "la marge reste stable"),
            chunk("notes.docx", 0, "notes de réunion"),
        ];
        let embeddings = vec![vec![1.0, 0.0], vec![0.9, 0.1], vec![0.5, 0.5]];
        store.add(&chunks, &embeddings).await.unwrap();
        store
    }

    fn engine_with(
        config: Config,
        store: MemoryStore,
    ) -> (ChatEngine, std::sync::Arc<Mutex<Vec<String>>>) {
        let prompts = std::sync::Arc::new(Mutex::new(Vec::new()));
        let llm = EchoLlm {
            prompts: prompts.clone(),
        };
        let embedder = FixedEmbedder {
            vector: vec![1.0, 0.0],
        };
        let engine = ChatEngine::new(config, Box::new(embedder), Box::new(store), Box::new(llm));
        (engine, prompts)
    }

    #[tokio::test]
    async fn ask_retrieves_prompts_and_cites() {
        let (mut engine, prompts) = engine_with(test_config(), seeded_store().await);

        let answer = engine.ask("Comment vont les ventes ?").await.unwrap();
        assert_eq!(answer.reponse, "réponse générée");

        // Both rapport chunks retrieved, cited once; notes.docx second.
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].fichier, "rapport.docx");
        assert_eq!(answer.sources[0].titre, "Titre rapport.docx");
        assert_eq!(answer.sources[1].fichier, "notes.docx");

        // The prompt template was filled: context, question, no leftover
        // placeholders.
        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.contains("les ventes ont augmenté"));
        assert!(prompt.contains("la marge reste stable"));
        assert!(prompt.contains("Comment vont les ventes ?"));
        assert!(!prompt.contains("{context}"));
        assert!(!prompt.contains("{question}"));
        assert!(!prompt.contains("{chat_history}"));

        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.history()[0].question, "Comment vont les ventes ?");
    }

    #[tokio::test]
    async fn ask_feeds_prior_turns_into_the_prompt() {
        let (mut engine, prompts) = engine_with(test_config(), seeded_store().await);

        engine.ask("première question").await.unwrap();
        engine.ask("deuxième question").await.unwrap();

        let prompts = prompts.lock().unwrap();
        assert!(prompts[1].contains("Humain : première question"));
        assert!(prompts[1].contains("Assistant : réponse générée"));
    }

    #[tokio::test]
    async fn history_is_bounded_oldest_turns_dropped() {
        let mut config = test_config();
        config.retrieval.history_limit = 2;
        let (mut engine, _prompts) = engine_with(config, seeded_store().await);

        engine.ask("q1").await.unwrap();
        engine.ask("q2").await.unwrap();
        engine.ask("q3").await.unwrap();

        assert_eq!(engine.history().len(), 2);
        assert_eq!(engine.history()[0].question, "q2");
        assert_eq!(engine.history()[1].question, "q3");
    }

    #[tokio::test]
    async fn top_k_caps_retrieval() {
        let mut config = test_config();
        config.retrieval.top_k = 1;
        let (mut engine, _prompts) = engine_with(config, seeded_store().await);

        let answer = engine.ask("question").await.unwrap();
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].fichier, "rapport.docx");
    }

    #[tokio::test]
    async fn ask_fails_cleanly_when_embedding_disabled() {
        let config = test_config();
        let embedder = ApiEmbedder::new(&config.embedding);
        let llm = EchoLlm {
            prompts: std::sync::Arc::new(Mutex::new(Vec::new())),
        };
        let mut engine = ChatEngine::new(
            config,
            Box::new(embedder),
            Box::new(seeded_store().await),
            Box::new(llm),
        );
        let err = engine.ask("question").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
        assert!(engine.history().is_empty());
    }

    #[test]
    fn answer_serializes_with_the_wire_field_names() {
        let answer = ChatAnswer {
            reponse: "Les ventes ont augmenté.".to_string(),
            sources: vec![Citation {
                fichier: "rapport.docx".to_string(),
                titre: "Rapport Mensuel".to_string(),
                date_modification: "2024-05-02T09:30:00+00:00".to_string(),
            }],
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["reponse"], "Les ventes ont augmenté.");
        assert_eq!(json["sources"][0]["fichier"], "rapport.docx");
        assert_eq!(json["sources"][0]["titre"], "Rapport Mensuel");
        assert_eq!(
            json["sources"][0]["date_modification"],
            "2024-05-02T09:30:00+00:00"
        );
        // The frontend keys on these exact names.
        let keys: Vec<&String> = json["sources"][0].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["date_modification", "fichier", "titre"]);
    }
}
