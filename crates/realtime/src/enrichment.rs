use std::sync::Arc;

use parley_config::EnrichmentFailurePolicy;
use parley_enrichment::Enricher;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::ConnectionHandle;
use crate::pipeline::Pipeline;
use crate::protocol::{ChatMessage, OutboundEvent};

/// Detached rewrite of messages that asked for a text filter.
///
/// Each message gets its own task bound to the originating session's
/// cancellation token. Only a finished rewrite re-enters the pipeline; a
/// cancelled task forwards nothing.
#[derive(Clone)]
pub struct EnrichmentStage {
    enricher: Arc<Enricher>,
    policy: EnrichmentFailurePolicy,
    pipeline: Pipeline,
}

impl EnrichmentStage {
    pub fn new(enricher: Arc<Enricher>, policy: EnrichmentFailurePolicy, pipeline: Pipeline) -> Self {
        Self {
            enricher,
            policy,
            pipeline,
        }
    }

    pub fn policy(&self) -> EnrichmentFailurePolicy {
        self.policy
    }

    pub fn spawn(
        &self,
        message: ChatMessage,
        origin: ConnectionHandle,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let stage = self.clone();
        tokio::spawn(async move { stage.process(message, origin, cancel).await })
    }

    async fn process(self, mut message: ChatMessage, origin: ConnectionHandle, cancel: CancellationToken) {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(message_id = %message.id, sender_id = %message.sender_id, "session ended, discarding rewrite");
                return;
            }
            outcome = self.enricher.enrich(&message.sender_id, message.text_filter_id, &message.text) => outcome,
        };

        match outcome {
            Ok(text) => message.text = text,
            Err(error) => {
                warn!(
                    message_id = %message.id,
                    sender_id = %message.sender_id,
                    filter_id = message.text_filter_id,
                    %error,
                    "message enrichment failed"
                );
                if let Err(error) = origin.try_deliver(OutboundEvent::error(error.client_message())) {
                    debug!(sender_id = %message.sender_id, %error, "could not report enrichment failure");
                }
                if self.policy == EnrichmentFailurePolicy::Drop {
                    return;
                }
            }
        }

        if cancel.is_cancelled() {
            debug!(message_id = %message.id, "session ended, discarding rewrite");
            return;
        }

        if let Err(error) = self.pipeline.forward_message(message).await {
            warn!(%error, "failed to forward enriched message");
        }
    }
}
