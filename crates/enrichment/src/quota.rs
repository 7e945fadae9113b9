use async_trait::async_trait;
use parley_database::{DatabaseError, UserRepository};

/// Per-user cumulative generation usage.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn used(&self, user_id: &str) -> Result<i64, DatabaseError>;
    async fn record(&self, user_id: &str, tokens: u32) -> Result<(), DatabaseError>;
}

#[async_trait]
impl UsageLedger for UserRepository {
    async fn used(&self, user_id: &str) -> Result<i64, DatabaseError> {
        self.used_tokens(user_id).await
    }

    async fn record(&self, user_id: &str, tokens: u32) -> Result<(), DatabaseError> {
        self.record_usage(user_id, i64::from(tokens)).await
    }
}
