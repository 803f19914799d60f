// Configuration management module
// Handles TOML configuration for the embedding backend, language model,
// chunking, retrieval and index reuse

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, IndexConfig, LlmConfig, LlmProvider, OllamaConfig, RetrievalConfig,
    ReusePolicy,
};

pub use crate::ingestion::chunking::ChunkingConfig;
