use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::RagError;
use crate::config::{Config, LlmProvider};
use crate::embeddings::{Embedder, OllamaClient};
use crate::llm::{self, LanguageModel, huggingface::TOKEN_ENV_VAR};
use crate::session::{
    AskOutcome, IngestReport, MODEL_BUSY_NOTICE, RATE_LIMITED_NOTICE, Session,
};
use crate::store::{RetrievedChunk, StoreManager};

fn print_report(report: &IngestReport) {
    if report.cached {
        println!("📄 {} is already loaded", report.document_name);
    } else if report.index_reused {
        println!(
            "📄 {} loaded and split into {} chunks (existing index reused)",
            report.document_name, report.chunk_count
        );
    } else {
        println!(
            "📄 {} loaded and split into {} chunks",
            report.document_name, report.chunk_count
        );
    }

    if let Some(sample) = &report.sample {
        println!();
        println!("{}", style("🔍 Sample Chunk").bold());
        println!("{}", sample.text);
        println!(
            "{}",
            style(format!(
                "Metadata: source={} page={} chunk={} offset={}",
                sample.source, sample.page, sample.chunk_index, sample.start_offset
            ))
            .dim()
        );
    }
}

fn print_retrieved(retrieved: &[RetrievedChunk]) {
    println!();
    println!("{}", style("🔍 Retrieved Context").bold());
    if retrieved.is_empty() {
        println!("   (no chunks retrieved)");
    }
    for (i, item) in retrieved.iter().enumerate() {
        println!(
            "{}",
            style(format!(
                "Chunk {} (page {}, score {:.3})",
                i + 1,
                item.chunk.page,
                item.score
            ))
            .bold()
        );
        println!("{}", item.chunk.text);
        println!();
    }
}

fn print_outcome(outcome: &AskOutcome) {
    match outcome {
        AskOutcome::Answered(answer) => {
            println!();
            println!("{}", style("📘 Tutor Answer").bold().green());
            println!("{}", answer.text);
            print_retrieved(&answer.retrieved);
        }
        AskOutcome::ModelUnavailable { retrieved } => {
            println!();
            println!("{}", style(format!("⚠️  {}", MODEL_BUSY_NOTICE)).yellow());
            print_retrieved(retrieved);
        }
        AskOutcome::RateLimited { retry_after } => {
            println!(
                "{}",
                style(format!(
                    "⏳ {} (retry in {:.1}s)",
                    RATE_LIMITED_NOTICE,
                    retry_after.as_secs_f32()
                ))
                .yellow()
            );
        }
    }
}

fn answer_model(config: &Config) -> Result<Box<dyn LanguageModel>> {
    if config.llm.provider == LlmProvider::HuggingFace && std::env::var(TOKEN_ENV_VAR).is_err() {
        println!(
            "{}",
            style(format!(
                "⚠️  {} is not set; requests may be rejected",
                TOKEN_ENV_VAR
            ))
            .yellow()
        );
    }
    llm::from_config(config).context("Failed to set up the answer model")
}

/// Load a document, index it and show a sample chunk
#[inline]
pub async fn ingest_document(config: &Config, path: &Path) -> Result<()> {
    let embedder = OllamaClient::new(config)?;
    let mut session = Session::new(config);

    let report = session
        .ingest(path, &embedder)
        .await
        .with_context(|| format!("Failed to ingest {}", path.display()))?;

    print_report(&report);
    Ok(())
}

/// Answer a single question about a document
#[inline]
pub async fn ask_question(config: &Config, path: &Path, question: &str) -> Result<()> {
    let embedder = OllamaClient::new(config)?;
    let model = answer_model(config)?;
    let mut session = Session::new(config);

    let report = session
        .ingest(path, &embedder)
        .await
        .with_context(|| format!("Failed to ingest {}", path.display()))?;
    debug!(
        "{} ready with {} chunks",
        report.document_name, report.chunk_count
    );

    let outcome = session.ask(question, &embedder, model.as_ref()).await?;
    print_outcome(&outcome);
    Ok(())
}

async fn load_into(session: &mut Session, path: &Path, embedder: &dyn Embedder) {
    match session.ingest(path, embedder).await {
        Ok(report) => print_report(&report),
        Err(e) => {
            error!("Failed to ingest {}: {}", path.display(), e);
            println!("❌ Could not load {}: {}", path.display(), e);
        }
    }
}

/// Interactive question loop over a single session
#[inline]
pub async fn run_chat(config: &Config, path: &Path) -> Result<()> {
    let embedder = OllamaClient::new(config)?;
    let model = answer_model(config)?;
    let mut session = Session::new(config);

    println!("{}", style("🧠 RAG Tutor").bold().cyan());
    println!("Ask questions about the document. Commands: :load <FILE>, :reset, :quit");
    println!();

    load_into(&mut session, path, &embedder).await;

    loop {
        println!();
        let line: String = Input::new()
            .with_prompt("Question")
            .allow_empty(true)
            .interact_text()?;
        let line = line.trim();

        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":reset" => {
                session.reset()?;
                println!("🗑️  Index cleared. Load a new document with :load <FILE>.");
                continue;
            }
            _ => {}
        }

        if let Some(file) = line.strip_prefix(":load") {
            let file = file.trim();
            if file.is_empty() {
                println!("Usage: :load <FILE>");
            } else {
                load_into(&mut session, &PathBuf::from(file), &embedder).await;
            }
            continue;
        }

        match session.ask(line, &embedder, model.as_ref()).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(RagError::NoDocument) => {
                println!("No document loaded. Use :load <FILE> first.");
            }
            Err(e) => {
                error!("Question failed: {}", e);
                println!("❌ {}", e);
            }
        }
    }

    Ok(())
}

/// Delete the persisted index
#[inline]
pub fn reset_index(config: &Config, assume_yes: bool) -> Result<()> {
    let store = StoreManager::new(config.vector_store_path(), config.index.reuse_existing);

    if !store.exists() {
        println!("No index to clear at {}", store.root().display());
        return Ok(());
    }

    if !assume_yes
        && !Confirm::new()
            .with_prompt(format!("Delete the index at {}?", store.root().display()))
            .default(false)
            .interact()?
    {
        println!("Nothing deleted.");
        return Ok(());
    }

    store.clear()?;
    println!("🗑️  Index cleared. Ingest a new document to rebuild it.");
    Ok(())
}

/// Show backend reachability and what the persisted index holds
#[inline]
pub fn show_status(config: &Config) -> Result<()> {
    println!("📊 RAG Tutor Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Embedding Backend:");
    match OllamaClient::new(config).and_then(|client| client.health_check()) {
        Ok(()) => {
            println!(
                "   ✅ Ollama: Connected ({}:{})",
                config.ollama.host, config.ollama.port
            );
            println!("   📋 Model: {}", config.ollama.model);
        }
        Err(e) => println!("   ❌ Ollama: {}", e),
    }
    println!();

    println!("🧠 Answer Model:");
    println!("   Provider: {}", config.llm.provider);
    println!("   Model: {}", config.llm.model);
    println!(
        "   Sampling: temperature {} / top_p {} / max tokens {} / repetition penalty {}",
        config.llm.temperature,
        config.llm.top_p,
        config.llm.max_new_tokens,
        config.llm.repetition_penalty
    );
    if config.llm.provider == LlmProvider::HuggingFace {
        let token_state = if std::env::var(TOKEN_ENV_VAR).is_ok() {
            "✅ set"
        } else {
            "⚠️  missing"
        };
        println!("   {}: {}", TOKEN_ENV_VAR, token_state);
    }
    println!();

    println!("🔍 Vector Index:");
    let store = StoreManager::new(config.vector_store_path(), config.index.reuse_existing);
    if !store.exists() {
        println!("   💤 No index at {}", store.root().display());
        return Ok(());
    }

    println!("   📁 Location: {}", store.root().display());
    match store.manifest() {
        Some(manifest) => {
            println!("   📄 Document: {}", manifest.document_name);
            println!("   🧩 Chunks: {}", manifest.chunk_count);
            println!("   📋 Embedding Model: {}", manifest.embedding_model);
            if let Some(dimension) = manifest.dimension {
                println!("   🔢 Dimensions: {}", dimension);
            }
            println!(
                "   🕒 Built: {}",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        None => println!("   ⚠️  No readable manifest"),
    }

    Ok(())
}
