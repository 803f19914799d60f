// Retrieval and answer pipeline
// Finds the chunks nearest to a question and asks the model to answer from them


use tracing::debug;

use crate::embeddings::Embedder;
use crate::llm::LanguageModel;
use crate::store::{RetrievedChunk, VectorIndex};
use crate::Result;

/// The exact reply expected when the context does not contain the answer
pub const UNKNOWN_ANSWER: &str = "I don't know based on the provided document.";

/// Render the tutor instruction prompt around `context` and `question`
#[inline]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a knowledgeable tutor.\n\
         \n\
         Answer the question ONLY using the context provided below.\n\
         If the answer is not present in the context, say exactly:\n\
         \"{UNKNOWN_ANSWER}\"\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question:\n\
         {question}\n\
         \n\
         Answer clearly, accurately, and like a tutor.\n"
    )
}

/// Up to `k` chunks ranked by descending similarity to `question`.
///
/// An empty index yields an empty list without calling the embedder.
#[inline]
pub async fn retrieve<E: Embedder + ?Sized>(
    index: &VectorIndex,
    embedder: &E,
    question: &str,
    k: usize,
) -> Result<Vec<RetrievedChunk>> {
    if index.is_empty() || k == 0 {
        debug!("Nothing to retrieve from an empty index");
        return Ok(Vec::new());
    }

    let query = embedder.embed_text(question)?;
    let retrieved = index.search(&query, k).await?;

    debug!(
        "Retrieved {} chunks (best score {:?})",
        retrieved.len(),
        retrieved.first().map(|r| r.score)
    );
    Ok(retrieved)
}

/// Concatenate chunk texts in retrieval order, each under its own header
#[inline]
pub fn render_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, retrieved)| {
            format!(
                "[Chunk {}] (page {})\n{}",
                i + 1,
                retrieved.chunk.page,
                retrieved.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ask `model` to answer `question` strictly from `context`
#[inline]
pub fn answer<M: LanguageModel + ?Sized>(
    model: &M,
    question: &str,
    context: &str,
) -> Result<String> {
    let prompt = build_prompt(context, question);
    model.generate(&prompt)
}
