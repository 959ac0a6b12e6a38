use super::*;
use crate::config::{Config, IngestConfig, JobsConfig, OllamaConfig, ServerConfig};
use crate::ingest::{Ingestor, RawMessage};
use chrono::Utc;
use tempfile::TempDir;

const TEST_DIMENSION: u32 = 4;

/// Maps a handful of known phrases onto fixed points so distances are
/// predictable; anything else lands at the origin.
struct PhraseEmbedder;

impl EmbeddingProvider for PhraseEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let vector = if text.contains("quarterly report") {
            vec![1.0, 0.0, 0.0, 0.0]
        } else if text.contains("report deadline") {
            vec![0.9, 0.1, 0.0, 0.0]
        } else if text.contains("lunch menu") {
            vec![0.0, 0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 0.0, 0.0]
        };
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION as usize
    }
}

fn raw(natural_key: &str, subject: &str) -> RawMessage {
    RawMessage {
        natural_key: natural_key.to_string(),
        sender: "sender@example.com".to_string(),
        recipient: "recipient@example.com".to_string(),
        subject: subject.to_string(),
        body: "Body text.".to_string(),
        received_at: Utc::now().naive_utc(),
    }
}

async fn create_test_searcher(temp_dir: &TempDir) -> (Searcher, Ingestor, Database) {
    let config = Config {
        ollama: OllamaConfig {
            embedding_dimension: TEST_DIMENSION,
            ..OllamaConfig::default()
        },
        server: ServerConfig::default(),
        jobs: JobsConfig::default(),
        ingest: IngestConfig::default(),
        base_dir: temp_dir.path().to_path_buf(),
    };

    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("should create database");
    let vector_store = Arc::new(
        VectorStore::new(&config)
            .await
            .expect("should create vector store"),
    );
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(PhraseEmbedder);

    let searcher = Searcher::new(
        database.clone(),
        Arc::clone(&vector_store),
        Arc::clone(&embedder),
    );
    let ingestor = Ingestor::new(database.clone(), vector_store, embedder);
    (searcher, ingestor, database)
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (searcher, _ingestor, _database) = create_test_searcher(&temp_dir).await;

    for query in ["", "   ", "\t\n"] {
        let result = searcher.search(query, DEFAULT_SEARCH_LIMIT).await;
        assert!(matches!(result, Err(MailError::InvalidInput(_))));
    }
}

#[tokio::test]
async fn search_on_empty_store_returns_no_hits() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (searcher, _ingestor, _database) = create_test_searcher(&temp_dir).await;

    let hits = searcher
        .search("quarterly report", DEFAULT_SEARCH_LIMIT)
        .await
        .expect("search succeeds");
    assert!(hits.is_empty());
}

#[tokio::test]
async fn results_rank_nearest_first() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (searcher, ingestor, _database) = create_test_searcher(&temp_dir).await;

    let report = ingestor
        .ingest(vec![
            raw("msg-report", "quarterly report attached"),
            raw("msg-deadline", "report deadline moved"),
            raw("msg-lunch", "lunch menu for friday"),
        ])
        .await;
    assert_eq!(report.saved, 3);

    let hits = searcher
        .search("quarterly report", 2)
        .await
        .expect("search succeeds");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].message.natural_key, "msg-report");
    assert_eq!(hits[1].message.natural_key, "msg-deadline");
    assert!(hits[0].distance <= hits[1].distance);
}

#[tokio::test]
async fn repeated_searches_return_identical_rankings() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (searcher, ingestor, _database) = create_test_searcher(&temp_dir).await;

    ingestor
        .ingest(vec![
            raw("msg-report", "quarterly report attached"),
            raw("msg-deadline", "report deadline moved"),
            raw("msg-lunch", "lunch menu for friday"),
        ])
        .await;

    let first = searcher
        .search("quarterly report", DEFAULT_SEARCH_LIMIT)
        .await
        .expect("search succeeds");
    let second = searcher
        .search("quarterly report", DEFAULT_SEARCH_LIMIT)
        .await
        .expect("search succeeds");

    let first_ids: Vec<i64> = first.iter().map(|h| h.message.id).collect();
    let second_ids: Vec<i64> = second.iter().map(|h| h.message.id).collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn hydration_failure_surfaces_as_database_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (searcher, ingestor, database) = create_test_searcher(&temp_dir).await;

    let report = ingestor
        .ingest(vec![raw("msg-report", "quarterly report attached")])
        .await;
    assert_eq!(report.saved, 1);

    // Take the relational store down; the vector half still answers, so the
    // failure comes from hit hydration.
    database.pool().close().await;

    let result = searcher.search("quarterly report", DEFAULT_SEARCH_LIMIT).await;
    assert!(matches!(result, Err(MailError::Database(_))));
}

#[tokio::test]
async fn limit_caps_the_result_count() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (searcher, ingestor, _database) = create_test_searcher(&temp_dir).await;

    ingestor
        .ingest(vec![
            raw("msg-1", "quarterly report attached"),
            raw("msg-2", "report deadline moved"),
            raw("msg-3", "lunch menu for friday"),
        ])
        .await;

    let hits = searcher
        .search("quarterly report", 1)
        .await
        .expect("search succeeds");
    assert_eq!(hits.len(), 1);
}
