use super::*;
use crate::config::{Config, IngestConfig, JobsConfig, OllamaConfig, ServerConfig};
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::ingest::{Ingestor, RawMessage};
use crate::jobs::{JobQueueConfig, JobState};
use crate::providers::{CompletionProvider, EmbeddingProvider};
use chrono::Utc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

const TEST_DIMENSION: u32 = 4;

struct StubEmbedder;

impl EmbeddingProvider for StubEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let len = text.len() as f32;
        Ok(vec![len, 1.0, 0.0, 0.0])
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION as usize
    }
}

struct StubCompleter;

impl CompletionProvider for StubCompleter {
    fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok("A one-sentence summary.".to_string())
    }
}

async fn create_test_state(temp_dir: &TempDir) -> (AppState, Ingestor) {
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
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(StubEmbedder);

    let searcher = Arc::new(Searcher::new(
        database.clone(),
        Arc::clone(&vector_store),
        Arc::clone(&embedder),
    ));
    let jobs = Arc::new(JobQueue::start(
        JobQueueConfig {
            workers: 1,
            completion_timeout: Duration::from_secs(2),
            max_retained_jobs: 16,
        },
        database.clone(),
        Arc::new(StubCompleter) as _,
    ));
    let ingestor = Ingestor::new(database, vector_store, embedder);

    (AppState { searcher, jobs }, ingestor)
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

async fn wait_for_terminal(state: &AppState, job_id: Uuid) -> crate::jobs::JobStatus {
    for _ in 0..200 {
        let status = state.jobs.poll(job_id).expect("job exists");
        if status.state.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish in time");
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let body = health().await;
    assert_eq!(body.0["status"], "ok");
}

#[tokio::test]
async fn search_handler_returns_ranked_results() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (state, ingestor) = create_test_state(&temp_dir).await;

    let report = ingestor
        .ingest(vec![raw("msg-1", "First"), raw("msg-2", "Second message")])
        .await;
    assert_eq!(report.saved, 2);

    let response = search(
        State(state),
        Json(SearchRequest {
            query: "First".to_string(),
            k: None,
        }),
    )
    .await
    .expect("search succeeds");

    assert_eq!(response.0.results.len(), 2);
    assert!(response.0.results[0].distance <= response.0.results[1].distance);
}

#[tokio::test]
async fn search_handler_rejects_empty_query() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (state, _ingestor) = create_test_state(&temp_dir).await;

    let error = search(
        State(state),
        Json(SearchRequest {
            query: "   ".to_string(),
            k: None,
        }),
    )
    .await
    .expect_err("empty query is rejected");

    assert_eq!(error.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn summarize_handler_accepts_and_job_completes() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (state, ingestor) = create_test_state(&temp_dir).await;

    ingestor.ingest(vec![raw("msg-1", "Summarize me")]).await;

    let (status_code, body) = summarize(State(state.clone()), Path(1)).await;
    assert_eq!(status_code, StatusCode::ACCEPTED);

    let status = wait_for_terminal(&state, body.0.job_id).await;
    assert_eq!(status.state, JobState::Succeeded);
    assert_eq!(status.result.as_deref(), Some("A one-sentence summary."));
}

#[tokio::test]
async fn summarize_handler_accepts_unknown_message() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (state, _ingestor) = create_test_state(&temp_dir).await;

    let (status_code, body) = summarize(State(state.clone()), Path(424_242)).await;
    assert_eq!(status_code, StatusCode::ACCEPTED);

    let status = wait_for_terminal(&state, body.0.job_id).await;
    assert_eq!(status.state, JobState::Failed);
}

#[tokio::test]
async fn task_status_handler_maps_unknown_job_to_404() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (state, _ingestor) = create_test_state(&temp_dir).await;

    let error = task_status(State(state), Path(Uuid::new_v4()))
        .await
        .expect_err("unknown job is an error");

    assert_eq!(error.status(), StatusCode::NOT_FOUND);
}

#[test]
fn api_error_status_mapping() {
    let cases = [
        (MailError::InvalidInput("q".into()), StatusCode::BAD_REQUEST),
        (MailError::NotFound("j".into()), StatusCode::NOT_FOUND),
        (
            MailError::Database("down".into()),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        (
            MailError::Embedding("down".into()),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        (
            MailError::Completion("down".into()),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        (
            MailError::Timeout("slow".into()),
            StatusCode::GATEWAY_TIMEOUT,
        ),
        (
            MailError::Config("bad".into()),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (error, expected) in cases {
        assert_eq!(ApiError::from(error).status(), expected);
    }
}
