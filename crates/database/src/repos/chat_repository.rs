//! Repository for chat and membership data access.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::entities::{chat::ChatRecord, parse_timestamp};
use crate::types::DatabaseResult;

#[derive(Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every member of a chat, oldest membership first. An unknown chat has no members.
    pub async fn member_ids(&self, chat_id: &str) -> DatabaseResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT user_id FROM chat_users WHERE chat_id = ? ORDER BY joined_at, user_id",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("user_id").map_err(Into::into))
            .collect()
    }

    /// Advance the chat's last-activity timestamp. Returns `false` when the chat does not exist.
    pub async fn touch(&self, chat_id: &str, at: DateTime<Utc>) -> DatabaseResult<bool> {
        let result = sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        let touched = result.rows_affected() > 0;
        debug!(chat_id, touched, "updated chat recency");
        Ok(touched)
    }

    pub async fn find(&self, chat_id: &str) -> DatabaseResult<Option<ChatRecord>> {
        let row = sqlx::query(
            "SELECT id, name, is_group, created_at, updated_at, chat_photo FROM chats WHERE id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(Some(ChatRecord {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            is_group: row.try_get("is_group")?,
            created_at: parse_timestamp("created_at", &created_at)?,
            updated_at: parse_timestamp("updated_at", &updated_at)?,
            chat_photo: row.try_get("chat_photo")?,
        }))
    }

    /// Insert a chat row. Used by seeding tools and tests.
    pub async fn create(
        &self,
        chat_id: &str,
        name: Option<&str>,
        is_group: bool,
    ) -> DatabaseResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO chats (id, name, is_group, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(chat_id)
        .bind(name)
        .bind(is_group)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_member(&self, chat_id: &str, user_id: &str) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO chat_users (chat_id, user_id, joined_at) VALUES (?, ?, ?)",
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
