// Database module
// Dual store: SQLite for message metadata, LanceDB for embedding vectors

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
