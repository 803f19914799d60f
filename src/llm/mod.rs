// Language model module
// The answer-generation seam and the hosted Hugging Face backend

pub mod huggingface;

pub use huggingface::HuggingFaceClient;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::config::{Config, LlmProvider};
use crate::embeddings::OllamaClient;

/// Sampling settings sent with every generation request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_new_tokens: u32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl Default for GenerationParams {
    #[inline]
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_new_tokens: 400,
            top_p: 0.9,
            repetition_penalty: 1.05,
        }
    }
}

/// A backend that completes a prompt in one synchronous call
pub trait LanguageModel: Send + Sync {
    /// Generate a completion; backend failures are `RagError::Model`
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the configured answer backend
#[inline]
pub fn from_config(config: &Config) -> Result<Box<dyn LanguageModel>> {
    match config.llm.provider {
        LlmProvider::HuggingFace => Ok(Box::new(HuggingFaceClient::new(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaClient::new(config)?.with_generation(
            config.llm.model.clone(),
            config.llm.generation_params(),
        ))),
    }
}
