// LanceDB vector database module
// Handles vector storage and nearest-neighbor search for message embeddings

pub mod vector_store;

use serde::{Deserialize, Serialize};

pub use vector_store::VectorStore;

/// Embedding record stored in LanceDB, one per message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageVector {
    /// Unique identifier for this vector row
    pub id: String,
    /// ID of the message row in the SQLite database
    pub message_id: i64,
    /// Provider-assigned message id, carried for diagnostics
    pub natural_key: String,
    /// The embedding vector; length must match the configured dimension
    pub vector: Vec<f32>,
}

/// A nearest-neighbor match returned from the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub message_id: i64,
    pub distance: f32,
}
