
use anyhow::{Context, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::Embedder;
use crate::config::Config;
use crate::llm::{GenerationParams, LanguageModel};
use crate::{RagError, Result};

/// Blocking client for a local Ollama server.
///
/// Failed requests are reported, never retried.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    agent: ureq::Agent,
    generation: Option<(String, GenerationParams)>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
    repeat_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

fn build_agent(timeout: Option<Duration>) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(timeout)
        .build()
        .into()
}

impl OllamaClient {
    /// Client for the configured embedding model
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| RagError::Config(format!("Failed to generate Ollama URL: {}", e)))?;

        Ok(Self {
            base_url,
            model: config.ollama.model.clone(),
            batch_size: config.ollama.batch_size.max(1),
            agent: build_agent(config.ollama.timeout_seconds.map(Duration::from_secs)),
            generation: None,
        })
    }

    /// Also answer prompts with `model` through `/api/generate`
    #[inline]
    pub fn with_generation(mut self, model: String, params: GenerationParams) -> Self {
        self.generation = Some((model, params));
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(Some(timeout));
        self
    }

    /// Test connection to Ollama server and verify model availability
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models()?;

        if models.iter().any(|m| m.name == self.model) {
            info!(
                "Health check passed for Ollama server at {} with model {}",
                self.base_url, self.model
            );
            Ok(())
        } else {
            let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available_models
            );
            Err(RagError::Embedding(format!(
                "Model '{}' is not available. Available models: {:?}",
                self.model, available_models
            )))
        }
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let fetch = || -> anyhow::Result<Vec<ModelInfo>> {
            let url = self
                .base_url
                .join("/api/tags")
                .context("Failed to build models URL")?;

            debug!("Fetching available models from {}", url);

            let response_text = self
                .agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
                .map_err(|e| anyhow!("Request to {} failed: {}", url, e))?;

            let models_response: ModelsResponse =
                serde_json::from_str(&response_text).context("Failed to parse models response")?;
            Ok(models_response.models)
        };

        let models = fetch().map_err(|e| RagError::Embedding(format!("{:#}", e)))?;
        debug!("Found {} models", models.len());
        Ok(models)
    }

    fn post_json<T: Serialize>(&self, path: &str, body: &T) -> anyhow::Result<String> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {}", path))?;

        let request_json = serde_json::to_string(body).context("Failed to serialize request")?;

        self.agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| anyhow!("Request to {} failed: {}", url, e))
    }

    fn embed_single_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response_text = self
            .post_json("/api/embed", &request)
            .context("Failed to generate embeddings")?;

        let response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ));
        }

        Ok(response.embeddings)
    }
}

impl Embedder for OllamaClient {
    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }

    #[inline]
    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let mut vectors = self
            .embed_single_batch(&[text.to_string()])
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("Empty embedding response".to_string()))
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let bar = if console::user_attended_stderr() {
            let bar = ProgressBar::new(texts.len() as u64);
            if let Ok(style) =
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding chunks {bar:30}")
            {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut results = Vec::with_capacity(texts.len());

        // Batches keep request bodies bounded
        for batch in texts.chunks(self.batch_size as usize) {
            let vectors = self
                .embed_single_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))
                .map_err(|e| {
                    bar.abandon();
                    RagError::Embedding(format!("{:#}", e))
                })?;

            results.extend(vectors);
            bar.inc(batch.len() as u64);
        }

        bar.finish_and_clear();
        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }
}

impl LanguageModel for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let (model, params) = self
            .generation
            .as_ref()
            .ok_or_else(|| RagError::Model("No Ollama generation model configured".to_string()))?;

        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: params.temperature,
                num_predict: params.max_new_tokens,
                top_p: params.top_p,
                repeat_penalty: params.repetition_penalty,
            },
        };

        debug!("Generating answer with {} (prompt length: {})", model, prompt.len());

        let response_text = self
            .post_json("/api/generate", &request)
            .map_err(|e| RagError::Model(format!("{:#}", e)))?;

        let response: GenerateResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Model(format!("Failed to parse generation response: {}", e)))?;

        Ok(response.response.trim().to_string())
    }
}
