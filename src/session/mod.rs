// Session controller
// Tracks the loaded document for one interactive session and gates questions

pub mod rate_gate;


pub use rate_gate::{Admission, RateGate};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::ingestion::{self, Chunk, ChunkingConfig};
use crate::llm::LanguageModel;
use crate::retrieval;
use crate::store::{RetrievedChunk, StoreManager, VectorIndex};
use crate::{RagError, Result};

/// Shown instead of the backend error when answer generation fails
pub const MODEL_BUSY_NOTICE: &str =
    "Model is busy or rate-limited. Please try again in a few seconds.";

/// Shown when a question arrives before the cooldown has passed
pub const RATE_LIMITED_NOTICE: &str =
    "Please wait a few seconds before asking another question.";

/// A document that has been split and indexed
#[derive(Debug)]
pub struct LoadedDocument {
    pub name: String,
    pub path: PathBuf,
    pub chunks: Vec<Chunk>,
    pub index: VectorIndex,
}

#[derive(Debug, Default)]
pub enum SessionState {
    #[default]
    Empty,
    Ready(LoadedDocument),
}

/// What an upload produced
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_name: String,
    pub chunk_count: usize,
    /// First chunk, for previewing the split
    pub sample: Option<Chunk>,
    /// The document was already loaded in this session; nothing was redone
    pub cached: bool,
    /// A persisted index was reused instead of embedding the chunks
    pub index_reused: bool,
}

/// A generated answer and the evidence it was produced from
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub retrieved: Vec<RetrievedChunk>,
}

#[derive(Debug, Clone)]
pub enum AskOutcome {
    Answered(Answer),
    /// Generation failed; the retrieved context is still available
    ModelUnavailable { retrieved: Vec<RetrievedChunk> },
    /// The question arrived inside the cooldown window and was not processed
    RateLimited { retry_after: Duration },
}

/// Per-session state: the current document, its index and the rate gate
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    store: StoreManager,
    gate: RateGate,
    chunking: ChunkingConfig,
    top_k: usize,
    documents_dir: PathBuf,
}

impl Session {
    #[inline]
    pub fn new(config: &Config) -> Self {
        Self {
            state: SessionState::Empty,
            store: StoreManager::new(config.vector_store_path(), config.index.reuse_existing),
            gate: RateGate::new(config.retrieval.cooldown()),
            chunking: config.chunking.clone(),
            top_k: config.retrieval.top_k,
            documents_dir: config.documents_dir(),
        }
    }

    #[inline]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[inline]
    pub fn store(&self) -> &StoreManager {
        &self.store
    }

    /// Name of the loaded document, if any
    #[inline]
    pub fn document_name(&self) -> Option<&str> {
        match &self.state {
            SessionState::Ready(doc) => Some(&doc.name),
            SessionState::Empty => None,
        }
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        match &self.state {
            SessionState::Ready(doc) => &doc.chunks,
            SessionState::Empty => &[],
        }
    }

    #[inline]
    pub fn last_call(&self) -> Option<DateTime<Utc>> {
        self.gate.last_call()
    }

    /// Load, split, embed and index the document at `path`.
    ///
    /// Uploading the document that is already loaded returns the cached
    /// chunks without touching the embedder. A failed upload leaves the
    /// session empty.
    #[inline]
    pub async fn ingest<E: Embedder + ?Sized>(
        &mut self,
        path: &Path,
        embedder: &E,
    ) -> Result<IngestReport> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| RagError::Load(format!("Not a file path: {}", path.display())))?;

        if let SessionState::Ready(doc) = &self.state {
            if doc.name == name {
                info!("{} is already loaded, reusing its chunks", name);
                return Ok(IngestReport {
                    document_name: name,
                    chunk_count: doc.chunks.len(),
                    sample: doc.chunks.first().cloned(),
                    cached: true,
                    index_reused: true,
                });
            }
        }

        self.state = SessionState::Empty;

        let staged = ingestion::stage_document(path, &self.documents_dir)?;
        let segments = ingestion::load_document(&staged)?;
        let chunks = ingestion::split_segments(&segments, &self.chunking);
        info!("Split {} into {} chunks", name, chunks.len());

        let loaded = self.store.load_or_build(&chunks, embedder, &name).await?;

        let report = IngestReport {
            document_name: name.clone(),
            chunk_count: chunks.len(),
            sample: chunks.first().cloned(),
            cached: false,
            index_reused: loaded.reused,
        };

        self.state = SessionState::Ready(LoadedDocument {
            name,
            path: staged,
            chunks,
            index: loaded.index,
        });

        Ok(report)
    }

    /// Answer `question` from the loaded document, subject to the rate gate
    #[inline]
    pub async fn ask<E: Embedder + ?Sized, M: LanguageModel + ?Sized>(
        &mut self,
        question: &str,
        embedder: &E,
        model: &M,
    ) -> Result<AskOutcome> {
        self.ask_at(question, embedder, model, Utc::now()).await
    }

    /// [`Session::ask`] with an explicit wall-clock time for the rate gate
    #[inline]
    pub async fn ask_at<E: Embedder + ?Sized, M: LanguageModel + ?Sized>(
        &mut self,
        question: &str,
        embedder: &E,
        model: &M,
        now: DateTime<Utc>,
    ) -> Result<AskOutcome> {
        let SessionState::Ready(doc) = &self.state else {
            return Err(RagError::NoDocument);
        };

        if let Admission::Limited { retry_after } = self.gate.check_at(now) {
            return Ok(AskOutcome::RateLimited { retry_after });
        }

        let retrieved = retrieval::retrieve(&doc.index, embedder, question, self.top_k).await?;
        let context = retrieval::render_context(&retrieved);

        match retrieval::answer(model, question, &context) {
            Ok(text) => Ok(AskOutcome::Answered(Answer { text, retrieved })),
            Err(RagError::Model(message)) => {
                warn!("Answer generation failed: {}", message);
                Ok(AskOutcome::ModelUnavailable { retrieved })
            }
            Err(e) => Err(e),
        }
    }

    /// Forget the loaded document and delete the persisted index
    #[inline]
    pub fn reset(&mut self) -> Result<()> {
        self.state = SessionState::Empty;
        self.gate.reset();
        self.store.clear()?;
        info!("Session reset");
        Ok(())
    }
}
