#[cfg(test)]
mod tests;

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::Message;
use crate::providers::EmbeddingProvider;
use crate::{MailError, Result};

pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// One search result: the full stored message plus its distance to the
/// query vector. Smaller distances rank first.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub message: Message,
    pub distance: f32,
}

/// Semantic search over stored messages. Embeds the query, asks the vector
/// store for the nearest neighbors, and hydrates each hit from the
/// relational store.
pub struct Searcher {
    database: Database,
    vector_store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Searcher {
    #[inline]
    pub fn new(
        database: Database,
        vector_store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            database,
            vector_store,
            embedder,
        }
    }

    /// Return up to `limit` messages ranked by ascending distance, ties
    /// broken by message id. An empty or whitespace-only query is rejected
    /// before any provider call.
    #[inline]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(MailError::InvalidInput(
                "query must not be empty".to_string(),
            ));
        }

        debug!("Searching for: {query}");

        let query_text = query.to_string();
        let embedder = Arc::clone(&self.embedder);
        let query_vector = tokio::task::spawn_blocking(move || embedder.embed(&query_text))
            .await
            .map_err(|e| MailError::Embedding(format!("Embedding task panicked: {e}")))?
            .map_err(|e| MailError::Embedding(format!("{e:#}")))?;

        let matches = self.vector_store.search_similar(&query_vector, limit).await?;

        let mut hits = Vec::with_capacity(matches.len());
        for vector_match in matches {
            // Hydration failures are store unavailability, same as a vector
            // store failure, not an internal error.
            let row = self
                .database
                .get_message_by_id(vector_match.message_id)
                .await
                .map_err(|e| MailError::Database(format!("{e:#}")))?;
            match row {
                Some(message) => hits.push(SearchHit {
                    message,
                    distance: vector_match.distance,
                }),
                // A vector without a row means the stores disagree; surface
                // the rest of the results rather than failing the search.
                None => warn!(
                    "Vector match references missing message id {}",
                    vector_match.message_id
                ),
            }
        }

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.message.id.cmp(&b.message.id))
        });

        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }
}
