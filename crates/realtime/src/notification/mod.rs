//! Push notifications for delivered messages.

mod fcm;

pub use fcm::FcmPushClient;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parley_config::PushConfig;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PushError;
use crate::protocol::ChatMessage;
use crate::queue::StageReceiver;
use crate::store::RecipientDirectory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl PushPayload {
    pub fn for_message(message: &ChatMessage, sender_name: &str) -> Self {
        let data = BTreeMap::from([
            ("type".to_string(), "message".to_string()),
            ("chat_id".to_string(), message.chat_id.clone()),
            ("message_id".to_string(), message.id.clone()),
            ("sender_name".to_string(), sender_name.to_string()),
            ("text".to_string(), message.text.clone()),
        ]);

        Self {
            title: format!("New Message from {sender_name}"),
            body: message.text.clone(),
            data,
        }
    }
}

/// Delivers one payload to one device token.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<(), PushError>;
}

/// Used when no push project is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPushSender;

#[async_trait]
impl PushSender for DisabledPushSender {
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<(), PushError> {
        debug!(%token, title = %payload.title, "push disabled, not sending notification");
        Ok(())
    }
}

pub fn push_sender_from_config(config: &PushConfig) -> Result<Arc<dyn PushSender>, PushError> {
    match FcmPushClient::from_config(config)? {
        Some(client) => {
            info!(endpoint = %config.endpoint, "push notifications enabled");
            Ok(Arc::new(client))
        }
        None => {
            info!("push notifications disabled, no project configured");
            Ok(Arc::new(DisabledPushSender))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct NotificationWorker {
    recipients: Arc<dyn RecipientDirectory>,
    push: Arc<dyn PushSender>,
}

impl NotificationWorker {
    pub fn new(recipients: Arc<dyn RecipientDirectory>, push: Arc<dyn PushSender>) -> Self {
        Self { recipients, push }
    }

    /// Push `message` to every other member's device. Each token is tried
    /// independently.
    pub async fn notify(&self, message: &ChatMessage) -> NotificationReport {
        let mut report = NotificationReport::default();

        let tokens = match self
            .recipients
            .push_tokens(&message.chat_id, &message.sender_id)
            .await
        {
            Ok(tokens) => tokens,
            Err(error) => {
                warn!(chat_id = %message.chat_id, %error, "failed to load push tokens");
                return report;
            }
        };
        if tokens.is_empty() {
            return report;
        }

        let sender_name = match self.recipients.display_name(&message.sender_id).await {
            Ok(Some(name)) if !name.is_empty() => name,
            Ok(_) => message.sender_id.clone(),
            Err(error) => {
                warn!(sender_id = %message.sender_id, %error, "failed to look up sender name");
                message.sender_id.clone()
            }
        };

        let payload = PushPayload::for_message(message, &sender_name);
        for token in &tokens {
            match self.push.send(token, &payload).await {
                Ok(()) => report.sent += 1,
                Err(error) => {
                    report.failed += 1;
                    warn!(message_id = %message.id, %error, "push notification failed");
                }
            }
        }

        debug!(
            message_id = %message.id,
            sent = report.sent,
            failed = report.failed,
            "notifications dispatched"
        );
        report
    }

    pub async fn run(self, mut queue: StageReceiver<ChatMessage>, shutdown: CancellationToken) {
        while let Some(message) = queue.next(&shutdown).await {
            self.notify(&message).await;
        }
        info!("notification worker stopped");
    }
}
