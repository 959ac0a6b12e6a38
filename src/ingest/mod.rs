
pub mod normalize;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::lancedb::{MessageVector, VectorStore};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::NewMessage;
use crate::providers::{EmbeddingProvider, Tagger};
use crate::{MailError, Result};

pub use normalize::{embedding_text, normalize};

/// A message as delivered by an external source, before it has an id or a
/// stored vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub natural_key: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub received_at: NaiveDateTime,
}

/// Produces batches of raw messages. Implementations may poll a mailbox, read
/// a file, or replay fixtures.
#[async_trait]
pub trait RawMessageSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawMessage>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestError {
    pub natural_key: String,
    pub reason: String,
}

/// Outcome of one ingestion batch. `saved + skipped + errors.len()` equals
/// the number of distinct natural keys attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub saved: usize,
    pub skipped: usize,
    pub errors: Vec<IngestError>,
}

impl IngestReport {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Drives a batch of raw messages through normalization, embedding, and the
/// dual store. The relational store is authoritative; a vector is only
/// written for rows this ingestor actually inserted.
pub struct Ingestor {
    database: Database,
    vector_store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    tagger: Option<Arc<dyn Tagger>>,
}

impl Ingestor {
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
            tagger: None,
        }
    }

    #[inline]
    pub fn with_tagger(mut self, tagger: Arc<dyn Tagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    /// Ingest a batch. Duplicate natural keys within the batch keep only the
    /// first occurrence; keys already stored are counted as skipped. One
    /// failing message does not abort the rest of the batch.
    #[inline]
    pub async fn ingest(&self, batch: Vec<RawMessage>) -> IngestReport {
        let mut report = IngestReport::default();
        let mut seen_keys = HashSet::new();

        for raw in batch {
            if !seen_keys.insert(raw.natural_key.clone()) {
                debug!(
                    "Skipping duplicate natural key within batch: {}",
                    raw.natural_key
                );
                report.skipped += 1;
                continue;
            }

            let natural_key = raw.natural_key.clone();
            match self.ingest_one(raw).await {
                Ok(true) => report.saved += 1,
                Ok(false) => {
                    debug!("Message already stored, skipping: {natural_key}");
                    report.skipped += 1;
                }
                Err(error) => {
                    warn!("Failed to ingest message {natural_key}: {error:#}");
                    report.errors.push(IngestError {
                        natural_key,
                        reason: format!("{error:#}"),
                    });
                }
            }
        }

        info!(
            "Ingestion batch complete: {} saved, {} skipped, {} errors",
            report.saved,
            report.skipped,
            report.errors.len()
        );
        report
    }

    /// Returns true when the message was newly inserted. Embedding happens
    /// before the insert so a provider failure leaves no partial row behind.
    async fn ingest_one(&self, raw: RawMessage) -> Result<bool> {
        let text = embedding_text(&raw.subject, &raw.body);
        let embedder = Arc::clone(&self.embedder);
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| MailError::Embedding(format!("Embedding task panicked: {e}")))?
            .map_err(|e| MailError::Embedding(format!("{e:#}")))?;

        let tags = match &self.tagger {
            Some(tagger) => tagger.tag(&raw.subject, &raw.body),
            None => Vec::new(),
        };

        let new_message = NewMessage {
            natural_key: raw.natural_key,
            sender: raw.sender,
            recipient: raw.recipient,
            subject: raw.subject,
            body: raw.body,
            received_at: raw.received_at,
            tags,
        };

        let (message, inserted) = self.database.insert_message_if_absent(new_message).await?;
        if !inserted {
            return Ok(false);
        }

        let vector_write = self
            .vector_store
            .add_message_vector(MessageVector {
                id: Uuid::new_v4().to_string(),
                message_id: message.id,
                natural_key: message.natural_key.clone(),
                vector,
            })
            .await;

        // Roll back the row if its vector never landed, otherwise the key is
        // permanently stored but unsearchable and a resubmission would skip
        // it as a duplicate.
        if let Err(error) = vector_write {
            if let Err(delete_error) = self.database.delete_message_by_id(message.id).await {
                warn!(
                    "Failed to roll back message {} after vector write failure: {delete_error:#}",
                    message.natural_key
                );
            }
            return Err(error);
        }

        Ok(true)
    }
}

/// Repeatedly fetch from a source and ingest until the shutdown signal flips
/// to true. Fetch failures are logged and retried on the next tick.
#[inline]
pub async fn run_polling(
    ingestor: &Ingestor,
    source: &dyn RawMessageSource,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Starting ingestion polling loop (interval: {interval:?})");

    loop {
        match source.fetch().await {
            Ok(batch) if batch.is_empty() => debug!("Source returned no messages"),
            Ok(batch) => {
                let report = ingestor.ingest(batch).await;
                if !report.is_clean() {
                    warn!("Polling batch finished with {} errors", report.errors.len());
                }
            }
            Err(error) => warn!("Failed to fetch messages from source: {error:#}"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Ingestion polling loop stopped");
}

/// Built-in demo batch for trying the pipeline without a live source.
#[inline]
pub fn sample_messages() -> Vec<RawMessage> {
    let received_at = chrono::Utc::now().naive_utc();
    vec![
        RawMessage {
            natural_key: "sample-google-security-alert".to_string(),
            sender: "no-reply@accounts.google.com".to_string(),
            recipient: "user@example.com".to_string(),
            subject: "Security alert".to_string(),
            body: "A new sign-in on Windows. We noticed a new sign-in to your \
                   Google Account on a Windows device. If this was you, you don't \
                   need to do anything. If not, we'll help you secure your account."
                .to_string(),
            received_at,
        },
        RawMessage {
            natural_key: "sample-techcrunch-ai-newsletter".to_string(),
            sender: "newsletter@techcrunch.com".to_string(),
            recipient: "user@example.com".to_string(),
            subject: "This Week in AI: The Latest on Large Language Models".to_string(),
            body: "The pace of development in artificial intelligence shows no \
                   signs of slowing down. This week, we saw major announcements \
                   regarding new large language models and their applications in \
                   enterprise software."
                .to_string(),
            received_at,
        },
        RawMessage {
            natural_key: "sample-saas-subscription-expiring".to_string(),
            sender: "billing@saas-company.com".to_string(),
            recipient: "user@example.com".to_string(),
            subject: "Your subscription is expiring soon".to_string(),
            body: "This is a reminder that your premium subscription is set to \
                   expire in 7 days. To avoid any interruption in service, please \
                   renew your subscription at your earliest convenience."
                .to_string(),
            received_at,
        },
    ]
}
