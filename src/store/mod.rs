// Store manager
// Owns the persisted vector index directory: reuse, atomic rebuild and removal

pub mod vector_index;


pub use vector_index::VectorIndex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ReusePolicy;
use crate::embeddings::Embedder;
use crate::ingestion::{Chunk, embed_chunks};
use crate::{RagError, Result};

const MANIFEST_FILE: &str = "manifest.json";
const DATA_DIR: &str = "lance";

/// A chunk returned by similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query, higher is closer
    pub score: f32,
}

/// Describes what a persisted index was built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub document_name: String,
    pub chunk_count: usize,
    pub embedding_model: String,
    pub dimension: Option<usize>,
    /// SHA-256 over the embedding model and every chunk with its position
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl IndexManifest {
    /// Fingerprint of the content an index would be built from
    #[inline]
    pub fn fingerprint(chunks: &[Chunk], embedding_model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(embedding_model.as_bytes());
        for chunk in chunks {
            hasher.update([0u8]);
            hasher.update(chunk.source.as_bytes());
            hasher.update(chunk.page.to_le_bytes());
            hasher.update((chunk.start_offset as u64).to_le_bytes());
            hasher.update(chunk.text.as_bytes());
        }
        let mut hex = String::with_capacity(64);
        for byte in hasher.finalize() {
            let _ = write!(hex, "{:02x}", byte);
        }
        hex
    }
}

/// An index handed back by [`StoreManager::load_or_build`]
#[derive(Debug)]
pub struct LoadedIndex {
    pub index: VectorIndex,
    pub manifest: Option<IndexManifest>,
    /// True when the persisted index was reused without embedding anything
    pub reused: bool,
}

/// Manages the single on-disk index location.
///
/// The location is either absent or holds a fully built index: builds are
/// written to a sibling staging directory and renamed into place.
#[derive(Debug, Clone)]
pub struct StoreManager {
    root: PathBuf,
    policy: ReusePolicy,
}

impl StoreManager {
    #[inline]
    pub fn new(root: impl Into<PathBuf>, policy: ReusePolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn policy(&self) -> ReusePolicy {
        self.policy
    }

    /// Whether a persisted index is present
    #[inline]
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Manifest of the persisted index, if present and readable
    #[inline]
    pub fn manifest(&self) -> Option<IndexManifest> {
        let path = self.root.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Return the persisted index, or build and persist one from `chunks`.
    ///
    /// With [`ReusePolicy::Always`] any persisted index is returned as is.
    /// With [`ReusePolicy::IfMatching`] it is reused only when its manifest
    /// fingerprint matches `chunks` and the embedder's model. Embedding
    /// failures leave the persisted location untouched.
    #[inline]
    pub async fn load_or_build<E: Embedder + ?Sized>(
        &self,
        chunks: &[Chunk],
        embedder: &E,
        document_name: &str,
    ) -> Result<LoadedIndex> {
        if self.exists() {
            let manifest = self.manifest();
            let reusable = match self.policy {
                ReusePolicy::Always => true,
                ReusePolicy::IfMatching => manifest.as_ref().is_some_and(|m| {
                    m.fingerprint == IndexManifest::fingerprint(chunks, embedder.model_name())
                }),
            };

            if reusable {
                info!("Reusing persisted index at {}", self.root.display());
                let index = VectorIndex::open(&self.root.join(DATA_DIR)).await?;
                return Ok(LoadedIndex {
                    index,
                    manifest,
                    reused: true,
                });
            }

            info!(
                "Persisted index at {} does not match {}, rebuilding",
                self.root.display(),
                document_name
            );
        }

        self.build(chunks, embedder, document_name).await
    }

    async fn build<E: Embedder + ?Sized>(
        &self,
        chunks: &[Chunk],
        embedder: &E,
        document_name: &str,
    ) -> Result<LoadedIndex> {
        let vectors = embed_chunks(embedder, chunks)?;

        let manifest = IndexManifest {
            document_name: document_name.to_string(),
            chunk_count: chunks.len(),
            embedding_model: embedder.model_name().to_string(),
            dimension: vectors.first().map(Vec::len),
            fingerprint: IndexManifest::fingerprint(chunks, embedder.model_name()),
            created_at: Utc::now(),
        };

        let staging = self.staging_path();
        let written = self.write_staging(&staging, chunks, &vectors, &manifest).await;
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                debug!("Failed to remove staging directory: {}", cleanup);
            }
            return Err(e);
        }

        self.clear()?;
        fs::rename(&staging, &self.root).map_err(|e| {
            RagError::Store(format!(
                "Failed to move index into {}: {}",
                self.root.display(),
                e
            ))
        })?;

        info!(
            "Built index for {} with {} chunks at {}",
            document_name,
            chunks.len(),
            self.root.display()
        );

        let index = VectorIndex::open(&self.root.join(DATA_DIR)).await?;
        Ok(LoadedIndex {
            index,
            manifest: Some(manifest),
            reused: false,
        })
    }

    async fn write_staging(
        &self,
        staging: &Path,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        manifest: &IndexManifest,
    ) -> Result<()> {
        VectorIndex::create(&staging.join(DATA_DIR), chunks, vectors).await?;

        let manifest_json = serde_json::to_string_pretty(manifest)
            .map_err(|e| RagError::Store(format!("Failed to serialize manifest: {}", e)))?;
        fs::write(staging.join(MANIFEST_FILE), manifest_json)?;
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let name = self
            .root
            .file_name()
            .map_or_else(|| "index".into(), |n| n.to_string_lossy().into_owned());
        self.root
            .with_file_name(format!(".{}.staging-{}", name, Uuid::new_v4()))
    }

    /// Delete the persisted index; a missing index is not an error
    #[inline]
    pub fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                info!("Removed persisted index at {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No persisted index at {}", self.root.display());
                Ok(())
            }
            Err(e) => Err(RagError::Store(format!(
                "Failed to remove {}: {}",
                self.root.display(),
                e
            ))),
        }
    }
}
