use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored mail message. Rows are immutable after insertion; `id` is
/// assigned by the store in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub natural_key: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub received_at: NaiveDateTime,
    pub tags: Vec<String>,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub natural_key: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub received_at: NaiveDateTime,
    pub tags: Vec<String>,
}

/// Raw row shape as stored; `tags` is a JSON array column.
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub natural_key: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub received_at: NaiveDateTime,
    pub tags: String,
    pub created_date: NaiveDateTime,
}

impl From<MessageRow> for Message {
    #[inline]
    fn from(row: MessageRow) -> Self {
        let tags = serde_json::from_str(&row.tags).unwrap_or_default();
        Self {
            id: row.id,
            natural_key: row.natural_key,
            sender: row.sender,
            recipient: row.recipient,
            subject: row.subject,
            body: row.body,
            received_at: row.received_at,
            tags,
            created_date: row.created_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn row_conversion_parses_tags() {
        let now = Utc::now().naive_utc();
        let row = MessageRow {
            id: 7,
            natural_key: "msg-7".to_string(),
            sender: "alice@example.com".to_string(),
            recipient: "bob@example.com".to_string(),
            subject: "Hello".to_string(),
            body: "World".to_string(),
            received_at: now,
            tags: r#"["alerts","work"]"#.to_string(),
            created_date: now,
        };

        let message = Message::from(row);
        assert_eq!(message.id, 7);
        assert_eq!(message.tags, vec!["alerts", "work"]);
    }

    #[test]
    fn row_conversion_tolerates_malformed_tags() {
        let now = Utc::now().naive_utc();
        let row = MessageRow {
            id: 1,
            natural_key: "msg-1".to_string(),
            sender: "a".to_string(),
            recipient: "b".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
            received_at: now,
            tags: "not json".to_string(),
            created_date: now,
        };

        let message = Message::from(row);
        assert!(message.tags.is_empty());
    }
}
