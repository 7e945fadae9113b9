use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    filters::{find_filter, rewrite_instruction, TextFilter},
    generator::TextGenerator,
    quota::UsageLedger,
    EnrichmentError,
};

/// Quota-gated rewriting of a single message.
///
/// Rewrites for one sender run one at a time, so the quota check always sees
/// the usage of every earlier rewrite. A sender crosses the ceiling by at most
/// one generation.
#[derive(Clone)]
pub struct Enricher {
    generator: Option<Arc<dyn TextGenerator>>,
    ledger: Arc<dyn UsageLedger>,
    ceiling: u32,
    senders: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Enricher {
    pub fn new(
        generator: Option<Arc<dyn TextGenerator>>,
        ledger: Arc<dyn UsageLedger>,
        ceiling: u32,
    ) -> Self {
        Self {
            generator,
            ledger,
            ceiling,
            senders: Arc::default(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.generator.is_some()
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Rewrite `text` for `sender_id` with the persona selected by `filter_id`.
    pub async fn enrich(
        &self,
        sender_id: &str,
        filter_id: i32,
        text: &str,
    ) -> Result<String, EnrichmentError> {
        let filter = find_filter(filter_id).ok_or(EnrichmentError::UnknownFilter(filter_id))?;
        if filter.command.is_empty() {
            return Ok(text.to_string());
        }

        let lock = self
            .senders
            .lock()
            .await
            .entry(sender_id.to_string())
            .or_default()
            .clone();
        let outcome = {
            let _turn = lock.lock().await;
            self.rewrite(sender_id, filter, text).await
        };

        let mut senders = self.senders.lock().await;
        // Map entry plus ours: nobody else is waiting on this sender.
        if Arc::strong_count(&lock) == 2 {
            senders.remove(sender_id);
        }
        outcome
    }

    async fn rewrite(
        &self,
        sender_id: &str,
        filter: &TextFilter,
        text: &str,
    ) -> Result<String, EnrichmentError> {
        let used = self.ledger.used(sender_id).await?;
        if used >= i64::from(self.ceiling) {
            return Err(EnrichmentError::QuotaExceeded {
                used,
                ceiling: self.ceiling,
            });
        }

        let generator = self.generator.as_ref().ok_or(EnrichmentError::Unavailable)?;
        let generation = generator.generate(&rewrite_instruction(filter, text)).await?;
        if generation.text.is_empty() {
            return Err(EnrichmentError::EmptyRewrite);
        }

        if let Err(error) = self.ledger.record(sender_id, generation.tokens_used).await {
            warn!(%sender_id, tokens = generation.tokens_used, %error, "failed to record generation usage");
        }

        debug!(
            %sender_id,
            filter = filter.name,
            tokens = generation.tokens_used,
            "message rewritten"
        );
        Ok(generation.text)
    }
}
