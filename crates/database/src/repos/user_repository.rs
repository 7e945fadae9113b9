//! User repository: display names, push tokens and generation usage.

use sqlx::SqlitePool;
use tracing::info;

use crate::entities::user::NewUser;
use crate::types::DatabaseResult;

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user: &NewUser) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO users (id, username, display_name, email, fcm_token) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.fcm_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `None` when the user is unknown or has no display name set.
    pub async fn display_name(&self, user_id: &str) -> DatabaseResult<Option<String>> {
        let name: Option<Option<String>> =
            sqlx::query_scalar("SELECT display_name FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(name.flatten())
    }

    /// Push tokens of every member of `chat_id` except `exclude_user_id`.
    pub async fn push_tokens_for_chat(
        &self,
        chat_id: &str,
        exclude_user_id: &str,
    ) -> DatabaseResult<Vec<String>> {
        let tokens: Vec<String> = sqlx::query_scalar(
            "SELECT u.fcm_token FROM users u
             JOIN chat_users cu ON cu.user_id = u.id
             WHERE cu.chat_id = ? AND u.id != ? AND u.fcm_token IS NOT NULL AND u.fcm_token != ''
             ORDER BY cu.joined_at, u.id",
        )
        .bind(chat_id)
        .bind(exclude_user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }

    pub async fn set_push_token(&self, user_id: &str, token: Option<&str>) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET fcm_token = ? WHERE id = ?")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Cumulative generation tokens spent by a user. Unknown users have spent nothing.
    pub async fn used_tokens(&self, user_id: &str) -> DatabaseResult<i64> {
        let used: Option<i64> = sqlx::query_scalar("SELECT used_tokens FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(used.unwrap_or(0))
    }

    pub async fn record_usage(&self, user_id: &str, tokens: i64) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET used_tokens = used_tokens + ? WHERE id = ?")
            .bind(tokens)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Zero every user's usage counter. Returns how many rows were reset.
    pub async fn reset_usage(&self) -> DatabaseResult<u64> {
        let result = sqlx::query("UPDATE users SET used_tokens = 0 WHERE used_tokens != 0")
            .execute(&self.pool)
            .await?;
        let reset = result.rows_affected();
        info!(reset, "reset generation usage counters");
        Ok(reset)
    }
}
