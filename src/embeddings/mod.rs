// Embeddings module
// The embedding backend seam and its Ollama implementation

pub mod ollama;

pub use ollama::OllamaClient;

use crate::Result;

/// A backend that turns text into fixed-dimension vectors.
///
/// The same embedder must be used to build an index and to query it, or
/// similarity scores are meaningless.
pub trait Embedder: Send + Sync {
    /// Model identifier, recorded alongside a built index
    fn model_name(&self) -> &str;

    /// Embed a single text
    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, one vector per input in input order
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed_text(text)).collect()
    }
}
