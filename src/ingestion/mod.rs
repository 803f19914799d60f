// Ingestion pipeline
// Stages an uploaded document, extracts page text, splits it into chunks and
// embeds them

pub mod chunking;
pub mod loader;


use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::embeddings::Embedder;
use crate::{RagError, Result};

pub use chunking::{Chunk, ChunkingConfig, split_segments, split_text};
pub use loader::{Segment, load_document};

/// Copy an uploaded file into the documents directory under its own name.
///
/// Returns the staged path. A file already living at that path is left as is.
#[inline]
pub fn stage_document(upload: &Path, documents_dir: &Path) -> Result<PathBuf> {
    let file_name = upload
        .file_name()
        .ok_or_else(|| RagError::Load(format!("Not a file path: {}", upload.display())))?;

    if !upload.is_file() {
        return Err(RagError::Load(format!(
            "Document not found: {}",
            upload.display()
        )));
    }

    fs::create_dir_all(documents_dir)?;
    let staged = documents_dir.join(file_name);

    let already_staged = staged.exists()
        && fs::canonicalize(&staged)? == fs::canonicalize(upload)?;
    if already_staged {
        debug!("{} is already staged", staged.display());
    } else {
        fs::copy(upload, &staged)?;
        info!("Staged {} at {}", upload.display(), staged.display());
    }

    Ok(staged)
}

/// Embed chunk texts, one vector per chunk in the same order
#[inline]
pub fn embed_chunks<E: Embedder + ?Sized>(embedder: &E, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts)?;

    if vectors.len() != chunks.len() {
        return Err(RagError::Embedding(format!(
            "Backend returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }

    debug!("Embedded {} chunks with {}", chunks.len(), embedder.model_name());
    Ok(vectors)
}
