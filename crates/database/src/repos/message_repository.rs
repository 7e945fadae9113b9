//! Repository for message data access operations.

use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::entities::{
    message::{MessageRecord, NewMessage},
    parse_timestamp,
};
use crate::types::DatabaseResult;

#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a message keyed by its client-supplied id.
    ///
    /// Returns `false` when a row with the same id already exists; the stored row is left untouched.
    pub async fn insert(&self, message: &NewMessage) -> DatabaseResult<bool> {
        let result = sqlx::query(
            "INSERT INTO messages (id, text, sender_id, chat_id, sent_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&message.id)
        .bind(&message.text)
        .bind(&message.sender_id)
        .bind(&message.chat_id)
        .bind(message.sent_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            info!(
                message_id = %message.id,
                chat_id = %message.chat_id,
                sender_id = %message.sender_id,
                "stored message"
            );
        }
        Ok(inserted)
    }

    pub async fn find(&self, message_id: &str) -> DatabaseResult<Option<MessageRecord>> {
        let row = sqlx::query(
            "SELECT id, text, sender_id, chat_id, sent_at FROM messages WHERE id = ?",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sent_at: String = row.try_get("sent_at")?;
        Ok(Some(MessageRecord {
            id: row.try_get("id")?,
            text: row.try_get("text")?,
            sender_id: row.try_get("sender_id")?,
            chat_id: row.try_get("chat_id")?,
            sent_at: parse_timestamp("sent_at", &sent_at)?,
        }))
    }

    pub async fn count_for_chat(&self, chat_id: &str) -> DatabaseResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
