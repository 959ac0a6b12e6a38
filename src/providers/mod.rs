// Provider seams for the external capabilities the pipeline consumes.
// Concrete implementations are injected at process start so tests can
// substitute doubles.

pub mod ollama;

use anyhow::Result;

pub use ollama::OllamaClient;

/// Maps text to a fixed-length embedding vector. Deterministic for identical
/// input; the dimension is fixed for the process lifetime and must match the
/// vector store schema.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}

/// Produces a natural-language completion for a prompt. Calls may fail or
/// run long; callers bound them with a timeout.
pub trait CompletionProvider: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Assigns category tags to a message at ingestion time. Optional; the
/// default pipeline stores no tags.
pub trait Tagger: Send + Sync {
    fn tag(&self, subject: &str, body: &str) -> Vec<String>;
}
