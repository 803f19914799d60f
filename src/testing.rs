// Deterministic stand-ins for the embedding and generation backends

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embeddings::Embedder;
use crate::llm::LanguageModel;
use crate::retrieval::UNKNOWN_ANSWER;
use crate::{RagError, Result};

pub(crate) const DIMENSION: usize = 64;

/// Bag-of-words embedder: each lowercase word hashes into one bucket
#[derive(Default)]
pub(crate) struct HashEmbedder {
    pub calls: AtomicUsize,
    pub texts_embedded: AtomicUsize,
}

impl HashEmbedder {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let hash = word
            .to_lowercase()
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| {
                (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
            });
        vector[(hash % DIMENSION as u64) as usize] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    } else {
        vector[0] = 1.0;
    }
    vector
}

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow-64"
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_embedded.fetch_add(1, Ordering::SeqCst);
        Ok(bag_of_words(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

/// Embedder whose backend is always down
pub(crate) struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "unreachable"
    }

    fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Embedding("connection refused".to_string()))
    }
}

/// Model that follows the tutor template: it echoes the first context line
/// when there is context and says it does not know otherwise
#[derive(Default)]
pub(crate) struct TemplateFollowingModel {
    pub prompts: Mutex<Vec<String>>,
}

impl TemplateFollowingModel {
    pub(crate) fn prompt_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

impl LanguageModel for TemplateFollowingModel {
    fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let context = prompt
            .split("Context:\n")
            .nth(1)
            .and_then(|rest| rest.split("\n\nQuestion:").next())
            .unwrap_or_default()
            .trim();

        if context.is_empty() {
            return Ok(UNKNOWN_ANSWER.to_string());
        }

        Ok(format!(
            "According to the document: {}",
            context.lines().nth(1).unwrap_or(context)
        ))
    }
}

/// Model backend that is always rate limited
pub(crate) struct BusyModel;

impl LanguageModel for BusyModel {
    fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Model("HTTP 429 Too Many Requests".to_string()))
    }
}
