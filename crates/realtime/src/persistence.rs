use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::protocol::ChatMessage;
use crate::queue::StageReceiver;
use crate::store::MessageStore;

/// Records delivered messages and bumps chat recency. Failures are logged and
/// the message is not retried.
///
/// Stored rows carry the server's receipt time, not the client's `sent_at`.
#[derive(Clone)]
pub struct PersistenceWorker {
    store: Arc<dyn MessageStore>,
}

impl PersistenceWorker {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    pub async fn persist(&self, message: &ChatMessage) {
        let now = Utc::now();
        match self.store.insert_message(message, now).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(message_id = %message.id, chat_id = %message.chat_id, "message already stored");
            }
            Err(err) => {
                error!(message_id = %message.id, chat_id = %message.chat_id, error = %err, "failed to store message");
            }
        }

        match self.store.touch_chat(&message.chat_id, now).await {
            Ok(true) => {}
            Ok(false) => debug!(chat_id = %message.chat_id, "no chat row to touch"),
            Err(err) => {
                error!(chat_id = %message.chat_id, error = %err, "failed to update chat recency");
            }
        }
    }

    pub async fn run(self, mut queue: StageReceiver<ChatMessage>, shutdown: CancellationToken) {
        while let Some(message) = queue.next(&shutdown).await {
            self.persist(&message).await;
        }
        info!("persistence worker stopped");
    }
}
