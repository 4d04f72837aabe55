//! The `chat` command: interactive question loop on stdin.

use anyhow::Result;
use std::io::{BufRead, Write};

use crate::config::Config;
use crate::embedding::ApiEmbedder;
use crate::rag::{self, ChatEngine};
use crate::store;

pub async fn run_chat(config: &Config) -> Result<()> {
    let store = store::open_store(&config.store).await?;
    let llm = rag::create_llm(config)?;
    let embedder = Box::new(ApiEmbedder::new(&config.embedding));
    let mut engine = ChatEngine::new(config.clone(), embedder, store, llm);

    println!("Assistant documentaire. Posez votre question ('quit' pour sortir).");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("quit") {
            break;
        }

        // A failed turn is reported and the loop continues; conversation
        // state is untouched.
        match engine.ask(question).await {
            Ok(answer) => {
                println!();
                println!("{}", answer.reponse);
                if !answer.sources.is_empty() {
                    println!();
                    println!("Sources :");
                    for source in &answer.sources {
                        println!("  - {} ({})", source.fichier, source.titre);
                    }
                }
                println!();
            }
            Err(e) => {
                eprintln!("Erreur : {:#}", e);
            }
        }
    }

    println!("Au revoir.");
    Ok(())
}
