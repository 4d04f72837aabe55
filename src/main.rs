use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docmill::{chat, config, corpus, index_cmd, inspect, server};

#[derive(Parser)]
#[command(name = "docmill")]
#[command(about = "Document question-answering pipeline: extract, index, chat")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = "./config/docmill.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Init,
    /// Extract every .docx in the source directory into the corpus snapshot
    Extract,
    /// Chunk and embed the corpus into the vector store
    Index {
        /// Re-index even if the store already holds vectors
        #[arg(long)]
        force: bool,
        /// Chunk and count without embedding or writing
        #[arg(long)]
        dry_run: bool,
        /// Override the embedding batch size
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Scan indexed chunks for keywords
    Inspect {
        /// Keywords to search for
        #[arg(required = true)]
        keywords: Vec<String>,
    },
    /// Interactive question loop on stdin
    Chat,
    /// Serve the HTTP chat API
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        return init(&cli.config);
    }

    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Extract => corpus::run_extract(&config),
        Commands::Index {
            force,
            dry_run,
            batch_size,
        } => index_cmd::run_index(&config, force, dry_run, batch_size).await,
        Commands::Inspect { keywords } => inspect::run_inspect(&config, &keywords).await,
        Commands::Chat => chat::run_chat(&config).await,
        Commands::Serve => server::run_server(&config).await,
    }
}

const STARTER_CONFIG: &str = r#"[source]
# Directory scanned for .docx files
dir = "./docs"
# Where the extracted corpus snapshot is written
corpus_path = "./data/corpus.json"

[chunking]
chunk_size = 600
chunk_overlap = 150

[embedding]
# "gemini", "openai", or "disabled"
# Gemini reads GOOGLE_API_KEY, OpenAI reads OPENAI_API_KEY.
provider = "disabled"
# model = "embedding-001"
# dims = 768

[store]
# "local" (SQLite) or "pinecone" (reads PINECONE_API_KEY)
backend = "local"
path = "./data/docmill.sqlite"
# index_name = "docmill"
# index_host = "myindex-abc1234.svc.aped-4627-b74a.pinecone.io"

[llm]
provider = "gemini"
model = "gemini-2.0-flash"
temperature = 0.3

[retrieval]
top_k = 5
history_limit = 10

[server]
bind = "127.0.0.1:8000"
"#;

fn init(path: &PathBuf) -> Result<()> {
    if path.exists() {
        println!("config already exists at {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, STARTER_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("wrote {}", path.display());
    println!("edit it, put .docx files in ./docs, then run `docmill extract`");
    Ok(())
}
