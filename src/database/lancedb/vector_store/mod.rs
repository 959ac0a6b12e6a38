
use super::{MessageVector, VectorMatch};
use crate::{MailError, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use std::sync::Arc;
use tracing::{debug, info};

/// Vector database store using LanceDB for similarity search over message
/// embeddings. The vector dimension is fixed at construction and enforced on
/// every insert and query.
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: usize,
}

impl VectorStore {
    /// Open (or create) the vector store under the configured base directory.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, MailError> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MailError::Database(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let store = Self {
            connection,
            table_name: "message_embeddings".to_string(),
            vector_dimension: config.ollama.embedding_dimension as usize,
        };

        store.initialize_table().await?;

        info!(
            "Vector store initialized with dimension {}",
            store.vector_dimension
        );
        Ok(store)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.vector_dimension
    }

    /// Create the embeddings table when missing; when present, verify its
    /// schema matches the configured dimension.
    async fn initialize_table(&self) -> Result<(), MailError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            let existing = self.detect_existing_vector_dimension().await?;
            if existing != self.vector_dimension {
                return Err(MailError::Database(format!(
                    "Vector table has dimension {} but configuration expects {}",
                    existing, self.vector_dimension
                )));
            }
            debug!("Embeddings table already exists with matching dimension");
            return Ok(());
        }

        let schema = self.create_schema();
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to create table: {}", e)))?;

        info!(
            "Embeddings table created with {} dimensions",
            self.vector_dimension
        );
        Ok(())
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize, MailError> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to open existing table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| MailError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(MailError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.vector_dimension as i32,
                ),
                false,
            ),
            Field::new("message_id", DataType::Int64, false),
            Field::new("natural_key", DataType::Utf8, false),
        ]))
    }

    /// Store a single message embedding.
    #[inline]
    pub async fn add_message_vector(&self, record: MessageVector) -> Result<(), MailError> {
        self.add_message_vectors(vec![record]).await
    }

    /// Store a batch of message embeddings.
    #[inline]
    pub async fn add_message_vectors(&self, records: Vec<MessageVector>) -> Result<(), MailError> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(());
        }

        for record in &records {
            if record.vector.len() != self.vector_dimension {
                return Err(MailError::Embedding(format!(
                    "Embedding for message {} has dimension {} but the store expects {}",
                    record.message_id,
                    record.vector.len(),
                    self.vector_dimension
                )));
            }
        }

        debug!("Storing batch of {} embeddings", records.len());

        let record_batch = self.create_record_batch(&records)?;

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to open table: {}", e)))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to insert embeddings: {}", e)))?;

        debug!("Stored {} embeddings", records.len());
        Ok(())
    }

    fn create_record_batch(&self, records: &[MessageVector]) -> Result<RecordBatch, MailError> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut message_ids = Vec::with_capacity(len);
        let mut natural_keys = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.vector_dimension);

        for record in records {
            ids.push(record.id.as_str());
            message_ids.push(record.message_id);
            natural_keys.push(record.natural_key.as_str());
            flat_values.extend_from_slice(&record.vector);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.vector_dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| MailError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn arrow::array::Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(Int64Array::from(message_ids)),
            Arc::new(StringArray::from(natural_keys)),
        ];

        RecordBatch::try_new(self.create_schema(), arrays)
            .map_err(|e| MailError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Nearest-neighbor search, ascending by distance. Results are capped at
    /// `limit` and tie-broken by message id for a deterministic ordering.
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorMatch>, MailError> {
        if query_vector.len() != self.vector_dimension {
            return Err(MailError::Embedding(format!(
                "Query vector has dimension {} but the store expects {}",
                query_vector.len(),
                self.vector_dimension
            )));
        }

        debug!("Searching for similar vectors with limit: {}", limit);

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to open table: {}", e)))?;

        let query = table
            .vector_search(query_vector)
            .map_err(|e| MailError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(limit);

        let results = query
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to execute search: {}", e)))?;

        let mut matches = self.parse_search_results_stream(results).await?;
        matches.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.message_id.cmp(&b.message_id))
        });
        matches.truncate(limit);

        Ok(matches)
    }

    async fn parse_search_results_stream(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<VectorMatch>, MailError> {
        let mut matches = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| MailError::Database(format!("Failed to read result stream: {}", e)))?
        {
            matches.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", matches.len());
        Ok(matches)
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<VectorMatch>, MailError> {
        if batch.num_rows() == 0 {
            return Ok(Vec::new());
        }

        let message_ids = batch
            .column_by_name("message_id")
            .ok_or_else(|| MailError::Database("Missing message_id column".to_string()))?
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| MailError::Database("Invalid message_id column type".to_string()))?;

        // A result row without a distance cannot be ranked; defaulting it
        // would promote a corrupt row to the top of the results.
        let distances = batch
            .column_by_name("_distance")
            .ok_or_else(|| {
                MailError::Database("Missing _distance column in search results".to_string())
            })?
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| MailError::Database("Invalid _distance column type".to_string()))?;

        let mut matches = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            if distances.is_null(row) {
                return Err(MailError::Database(format!(
                    "Null distance for message {} in search results",
                    message_ids.value(row)
                )));
            }

            matches.push(VectorMatch {
                message_id: message_ids.value(row),
                distance: distances.value(row),
            });
        }

        Ok(matches)
    }

    /// Total number of stored embeddings.
    #[inline]
    pub async fn count_vectors(&self) -> Result<u64, MailError> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to open table: {}", e)))?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| MailError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }
}
