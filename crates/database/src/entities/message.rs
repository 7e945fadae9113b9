use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A delivered chat message about to be recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub id: String,
    pub text: String,
    pub sender_id: String,
    pub chat_id: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    pub id: String,
    pub text: String,
    pub sender_id: String,
    pub chat_id: String,
    pub sent_at: DateTime<Utc>,
}
