use parley_config::PipelineConfig;

use crate::error::DeliveryError;
use crate::protocol::{ChatAction, ChatMessage};
use crate::queue::{stage_queue, StageReceiver, StageSender};

/// Producer side of the four stage queues, shared by every session and
/// enrichment task.
#[derive(Debug, Clone)]
pub struct Pipeline {
    messages: StageSender<ChatMessage>,
    actions: StageSender<ChatAction>,
    persistence: StageSender<ChatMessage>,
    notifications: StageSender<ChatMessage>,
}

/// Consumer side of the four stage queues, one per worker.
#[derive(Debug)]
pub struct PipelineReceivers {
    pub messages: StageReceiver<ChatMessage>,
    pub actions: StageReceiver<ChatAction>,
    pub persistence: StageReceiver<ChatMessage>,
    pub notifications: StageReceiver<ChatMessage>,
}

pub fn channel(config: &PipelineConfig) -> (Pipeline, PipelineReceivers) {
    let (messages, message_rx) = stage_queue("message", config.message);
    let (actions, action_rx) = stage_queue("action", config.action);
    let (persistence, persistence_rx) = stage_queue("persistence", config.persistence);
    let (notifications, notification_rx) = stage_queue("notification", config.notification);

    (
        Pipeline {
            messages,
            actions,
            persistence,
            notifications,
        },
        PipelineReceivers {
            messages: message_rx,
            actions: action_rx,
            persistence: persistence_rx,
            notifications: notification_rx,
        },
    )
}

impl Pipeline {
    /// Hand a final message to the dispatcher, persistence and notification
    /// queues. Every queue is attempted; the first failure is returned.
    pub async fn forward_message(&self, message: ChatMessage) -> Result<(), DeliveryError> {
        let dispatched = self.messages.send(message.clone()).await;
        let persisted = self.persistence.send(message.clone()).await;
        let notified = self.notifications.send(message).await;

        dispatched.and(persisted).and(notified)
    }

    pub async fn forward_action(&self, action: ChatAction) -> Result<(), DeliveryError> {
        self.actions.send(action).await
    }
}
