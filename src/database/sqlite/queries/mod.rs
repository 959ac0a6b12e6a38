
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

use crate::database::sqlite::DbPool;
use crate::database::sqlite::models::{Message, MessageRow, NewMessage};

const MESSAGE_COLUMNS: &str =
    "id, natural_key, sender, recipient, subject, body, received_at, tags, created_date";

pub struct MessageQueries;

impl MessageQueries {
    /// Insert a message unless a row with the same natural key already exists.
    ///
    /// Returns the stored row and whether this call inserted it. Atomicity
    /// comes from the unique index on `natural_key` together with
    /// `ON CONFLICT DO NOTHING`, so concurrent callers racing on the same key
    /// produce exactly one row.
    #[inline]
    pub async fn insert_if_absent(pool: &DbPool, message: NewMessage) -> Result<(Message, bool)> {
        let tags =
            serde_json::to_string(&message.tags).context("Failed to serialize message tags")?;
        let now = Utc::now().naive_utc();

        let inserted: Option<MessageRow> = sqlx::query_as(
            "INSERT INTO messages (natural_key, sender, recipient, subject, body, received_at, tags, created_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(natural_key) DO NOTHING \
             RETURNING id, natural_key, sender, recipient, subject, body, received_at, tags, created_date",
        )
        .bind(&message.natural_key)
        .bind(&message.sender)
        .bind(&message.recipient)
        .bind(&message.subject)
        .bind(&message.body)
        .bind(message.received_at)
        .bind(&tags)
        .bind(now)
        .fetch_optional(pool)
        .await
        .context("Failed to insert message")?;

        if let Some(row) = inserted {
            debug!(
                "Inserted message {} (natural key {})",
                row.id, row.natural_key
            );
            return Ok((row.into(), true));
        }

        // Conflict: the row already exists, possibly written by a concurrent
        // caller whose insert committed first.
        let existing = Self::get_by_natural_key(pool, &message.natural_key)
            .await?
            .with_context(|| {
                format!(
                    "Message with natural key {} vanished after conflict",
                    message.natural_key
                )
            })?;

        Ok((existing, false))
    }

    #[inline]
    pub async fn get_by_id(pool: &DbPool, id: i64) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch message by id")?;

        Ok(row.map(Into::into))
    }

    #[inline]
    pub async fn get_by_natural_key(pool: &DbPool, natural_key: &str) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE natural_key = ?"
        ))
        .bind(natural_key)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch message by natural key")?;

        Ok(row.map(Into::into))
    }

    /// Remove a row by id. Returns whether a row was deleted. Used to roll
    /// back a message whose vector write failed, so the same natural key can
    /// be resubmitted.
    #[inline]
    pub async fn delete_by_id(pool: &DbPool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete message")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn count(pool: &DbPool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(pool)
            .await
            .context("Failed to count messages")?;

        Ok(count)
    }
}
