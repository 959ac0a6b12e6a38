use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::ingest::{Ingestor, RawMessage, sample_messages};
use crate::jobs::{JobQueue, JobQueueConfig};
use crate::providers::OllamaClient;
use crate::search::Searcher;
use crate::server::{AppState, serve};

struct Stores {
    config: Config,
    database: Database,
    vector_store: Arc<VectorStore>,
    client: Arc<OllamaClient>,
}

async fn open_stores() -> Result<Stores> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let database = Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to open message database")?;
    let vector_store = Arc::new(
        VectorStore::new(&config)
            .await
            .context("Failed to open vector store")?,
    );
    let client = Arc::new(OllamaClient::new(&config.ollama)?);

    Ok(Stores {
        config,
        database,
        vector_store,
        client,
    })
}

fn read_batch_file(path: &Path) -> Result<Vec<RawMessage>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse batch file as a message array: {}", path.display()))
}

/// Ingest a batch of messages from a JSON file, or the built-in sample
/// batch when no file is given.
#[inline]
pub async fn ingest(file: Option<PathBuf>, sample: bool) -> Result<()> {
    let batch = match (&file, sample) {
        (Some(path), _) => read_batch_file(path)?,
        (None, true) => sample_messages(),
        (None, false) => {
            anyhow::bail!("Nothing to ingest: pass --file <path> or --sample");
        }
    };

    let stores = open_stores().await?;
    let ingestor = Ingestor::new(
        stores.database,
        stores.vector_store,
        Arc::clone(&stores.client) as _,
    );

    let total = batch.len();
    info!("Ingesting {total} messages");
    let report = ingestor.ingest(batch).await;

    println!(
        "Ingested {total} messages: {} saved, {} skipped, {} failed",
        report.saved,
        report.skipped,
        report.errors.len()
    );
    for error in &report.errors {
        println!("  {}: {}", error.natural_key, error.reason);
    }

    if report.is_clean() {
        Ok(())
    } else {
        anyhow::bail!("{} messages failed to ingest", report.errors.len())
    }
}

/// Start the HTTP service: search handlers plus the summarization worker
/// pool. Runs until the process is terminated.
#[inline]
pub async fn serve_http() -> Result<()> {
    let stores = open_stores().await?;

    // The service can start without Ollama being reachable; search and
    // summarize requests will fail individually until it comes back.
    let health_client = Arc::clone(&stores.client);
    let health = tokio::task::spawn_blocking(move || health_client.health_check())
        .await
        .context("Health check task failed")?;
    if let Err(error) = health {
        warn!("Ollama health check failed, starting anyway: {error:#}");
    }

    let searcher = Arc::new(Searcher::new(
        stores.database.clone(),
        Arc::clone(&stores.vector_store),
        Arc::clone(&stores.client) as _,
    ));
    let jobs = Arc::new(JobQueue::start(
        JobQueueConfig::from_config(&stores.config),
        stores.database,
        Arc::clone(&stores.client) as _,
    ));

    serve(&stores.config.server, AppState { searcher, jobs }).await
}

/// Print storage counts for a quick health overview.
#[inline]
pub async fn status() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let database = Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to open message database")?;
    let vector_store = VectorStore::new(&config)
        .await
        .context("Failed to open vector store")?;

    let messages = database.count_messages().await?;
    let vectors = vector_store.count_vectors().await?;

    println!("Storage directory: {}", config.get_base_dir().display());
    println!("Messages stored:   {messages}");
    println!("Vectors stored:    {vectors}");

    if messages != vectors as i64 {
        println!("Warning: message and vector counts differ");
    }

    Ok(())
}
