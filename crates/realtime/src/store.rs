//! Collaborator contracts the pipeline workers depend on, with their SQLite
//! implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_database::{
    ChatRepository, DatabaseError, MessageRepository, NewMessage, UserRepository,
};

use crate::protocol::ChatMessage;

/// Chat id → member ids.
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    async fn members(&self, chat_id: &str) -> Result<Vec<String>, DatabaseError>;
}

/// Durable message record plus chat recency.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Stores the message with `stored_at` as its timestamp. Returns `false`
    /// if a message with the same id was already stored.
    async fn insert_message(
        &self,
        message: &ChatMessage,
        stored_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;
    async fn touch_chat(&self, chat_id: &str, at: DateTime<Utc>) -> Result<bool, DatabaseError>;
}

/// Push targets and sender names for notifications.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn push_tokens(&self, chat_id: &str, exclude_user_id: &str)
        -> Result<Vec<String>, DatabaseError>;
    async fn display_name(&self, user_id: &str) -> Result<Option<String>, DatabaseError>;
}

#[async_trait]
impl ChatDirectory for ChatRepository {
    async fn members(&self, chat_id: &str) -> Result<Vec<String>, DatabaseError> {
        self.member_ids(chat_id).await
    }
}

#[async_trait]
impl RecipientDirectory for UserRepository {
    async fn push_tokens(
        &self,
        chat_id: &str,
        exclude_user_id: &str,
    ) -> Result<Vec<String>, DatabaseError> {
        self.push_tokens_for_chat(chat_id, exclude_user_id).await
    }

    async fn display_name(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        UserRepository::display_name(self, user_id).await
    }
}

#[derive(Clone)]
pub struct SqliteMessageStore {
    messages: MessageRepository,
    chats: ChatRepository,
}

impl SqliteMessageStore {
    pub fn new(messages: MessageRepository, chats: ChatRepository) -> Self {
        Self { messages, chats }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert_message(
        &self,
        message: &ChatMessage,
        stored_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        self.messages
            .insert(&NewMessage {
                id: message.id.clone(),
                text: message.text.clone(),
                sender_id: message.sender_id.clone(),
                chat_id: message.chat_id.clone(),
                sent_at: stored_at,
            })
            .await
    }

    async fn touch_chat(&self, chat_id: &str, at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        self.chats.touch(chat_id, at).await
    }
}
