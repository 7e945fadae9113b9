use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRecord {
    pub id: String,
    pub name: Option<String>,
    pub is_group: bool,
    pub created_at: DateTime<Utc>,
    /// Last-activity timestamp; advanced every time a message is persisted.
    pub updated_at: DateTime<Utc>,
    pub chat_photo: Option<String>,
}
