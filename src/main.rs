use clap::{Parser, Subcommand};
use mailseek::Result;
use mailseek::commands::{ingest, serve_http, status};
use mailseek::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mailseek")]
#[command(about = "Semantic email search and summarization service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest a batch of messages into the stores
    Ingest {
        /// JSON file containing an array of messages
        #[arg(long)]
        file: Option<PathBuf>,
        /// Ingest the built-in sample batch instead of a file
        #[arg(long)]
        sample: bool,
    },
    /// Start the HTTP search and summarization service
    Serve,
    /// Show storage counts and health
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest { file, sample } => {
            ingest(file, sample).await?;
        }
        Commands::Serve => {
            serve_http().await?;
        }
        Commands::Status => {
            status().await?;
        }
    }

    Ok(())
}
