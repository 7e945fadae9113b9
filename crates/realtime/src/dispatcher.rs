use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{ChatAction, ChatMessage, OutboundEvent};
use crate::queue::StageReceiver;
use crate::registry::Registry;
use crate::store::ChatDirectory;

/// Outcome of delivering one event to a chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub skipped: usize,
}

/// Delivers events to every registered member of their chat.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Registry,
    directory: Arc<dyn ChatDirectory>,
}

impl Dispatcher {
    pub fn new(registry: Registry, directory: Arc<dyn ChatDirectory>) -> Self {
        Self {
            registry,
            directory,
        }
    }

    pub async fn fan_out(&self, chat_id: &str, event: OutboundEvent) -> FanOut {
        let members = match self.directory.members(chat_id).await {
            Ok(members) => members,
            Err(error) => {
                warn!(%chat_id, kind = event.kind(), %error, "membership lookup failed, skipping event");
                return FanOut::default();
            }
        };

        let mut outcome = FanOut::default();
        for member in &members {
            if self.registry.send(member, event.clone()).await {
                outcome.delivered += 1;
            } else {
                outcome.skipped += 1;
            }
        }

        debug!(
            %chat_id,
            kind = event.kind(),
            delivered = outcome.delivered,
            skipped = outcome.skipped,
            "fan-out complete"
        );
        outcome
    }

    pub async fn run_messages(
        self,
        mut queue: StageReceiver<ChatMessage>,
        shutdown: CancellationToken,
    ) {
        while let Some(message) = queue.next(&shutdown).await {
            let chat_id = message.chat_id.clone();
            self.fan_out(&chat_id, OutboundEvent::Message(message)).await;
        }
        info!("message dispatcher stopped");
    }

    pub async fn run_actions(self, mut queue: StageReceiver<ChatAction>, shutdown: CancellationToken) {
        while let Some(action) = queue.next(&shutdown).await {
            let chat_id = action.chat_id.clone();
            self.fan_out(&chat_id, OutboundEvent::Action(action)).await;
        }
        info!("action dispatcher stopped");
    }
}
