use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rag_tutor::commands::{ask_question, ingest_document, reset_index, run_chat, show_status};
use rag_tutor::config::{Config, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "rag-tutor")]
#[command(about = "Ask questions about a PDF, answered from its own text")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, staged documents and the index
    #[arg(long, global = true, env = "RAG_TUTOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding and answer backends
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Load a document, split it and build its index
    Ingest {
        /// PDF, .txt or .md file
        file: PathBuf,
    },
    /// Ask a single question about a document
    Ask {
        /// PDF, .txt or .md file
        file: PathBuf,
        /// The question to answer
        question: String,
    },
    /// Interactive question session over a document
    Chat {
        /// PDF, .txt or .md file
        file: PathBuf,
    },
    /// Delete the persisted index
    Reset {
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Show backend and index status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => Config::default_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&data_dir)?;
            } else {
                run_interactive_config(&data_dir)?;
            }
        }
        Commands::Ingest { file } => {
            ingest_document(&Config::load(&data_dir)?, &file).await?;
        }
        Commands::Ask { file, question } => {
            ask_question(&Config::load(&data_dir)?, &file, &question).await?;
        }
        Commands::Chat { file } => {
            run_chat(&Config::load(&data_dir)?, &file).await?;
        }
        Commands::Reset { yes } => {
            reset_index(&Config::load(&data_dir)?, yes)?;
        }
        Commands::Status => {
            show_status(&Config::load(&data_dir)?)?;
        }
    }

    Ok(())
}
