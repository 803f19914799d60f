#[cfg(test)]
mod tests;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{GenerationParams, LanguageModel};
use crate::config::Config;
use crate::{RagError, Result};

/// Environment variable holding the Hugging Face access token
pub const TOKEN_ENV_VAR: &str = "HUGGINGFACEHUB_API_TOKEN";

/// Client for the Hugging Face text-generation inference API
#[derive(Debug, Clone)]
pub struct HuggingFaceClient {
    model_url: Url,
    token: Option<String>,
    params: GenerationParams,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    temperature: f32,
    max_new_tokens: u32,
    top_p: f32,
    repetition_penalty: f32,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Batch(Vec<GeneratedText>),
    Single(GeneratedText),
    Error { error: String },
}

impl HuggingFaceClient {
    /// Client for the configured model; the token is read from the environment
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let model_url = config
            .llm
            .model_url()
            .map_err(|e| RagError::Config(format!("Invalid inference endpoint: {}", e)))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(config.llm.timeout_seconds.map(Duration::from_secs))
            .build()
            .into();

        Ok(Self {
            model_url,
            token: std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.trim().is_empty()),
            params: config.llm.generation_params(),
            agent,
        })
    }

    #[inline]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    #[inline]
    pub fn model_url(&self) -> &Url {
        &self.model_url
    }

    fn request(&self, prompt: &str) -> anyhow::Result<String> {
        let request = GenerationRequest {
            inputs: prompt,
            parameters: GenerationParameters {
                temperature: self.params.temperature,
                max_new_tokens: self.params.max_new_tokens,
                top_p: self.params.top_p,
                repetition_penalty: self.params.repetition_penalty,
                return_full_text: false,
            },
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generation request")?;

        let mut builder = self
            .agent
            .post(self.model_url.as_str())
            .header("Content-Type", "application/json");
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", &format!("Bearer {}", token));
        }

        let response_text = builder
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| anyhow!("Request to {} failed: {}", self.model_url, e))?;

        let response: GenerationResponse = serde_json::from_str(&response_text)
            .context("Failed to parse generation response")?;

        match response {
            GenerationResponse::Batch(mut outputs) => outputs
                .pop()
                .map(|o| o.generated_text)
                .ok_or_else(|| anyhow!("Inference API returned no generations")),
            GenerationResponse::Single(output) => Ok(output.generated_text),
            GenerationResponse::Error { error } => Err(anyhow!("Inference API error: {}", error)),
        }
    }
}

impl LanguageModel for HuggingFaceClient {
    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        debug!(
            "Requesting generation from {} (prompt length: {})",
            self.model_url,
            prompt.len()
        );

        self.request(prompt)
            .map(|text| text.trim().to_string())
            .map_err(|e| RagError::Model(format!("{:#}", e)))
    }
}
