//! Message rewriting ("text filters") for the realtime pipeline.
//!
//! A filter id selects a persona from a fixed table. Rewrites go through an
//! external text-generation provider and are metered per user in generation
//! tokens against a configurable ceiling.

mod enricher;
mod filters;
mod generator;
mod quota;

pub use enricher::Enricher;
pub use filters::{find_filter, rewrite_instruction, TextFilter, TEXT_FILTERS};
pub use generator::{Generation, OpenRouterGenerator, TextGenerator};
pub use quota::UsageLedger;

use denkwerk::LLMError;
use parley_database::DatabaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("token quota exceeded ({used} of {ceiling} used)")]
    QuotaExceeded { used: i64, ceiling: u32 },
    #[error("unknown text filter {0}")]
    UnknownFilter(i32),
    #[error("text filters are unavailable")]
    Unavailable,
    #[error("missing OpenRouter API key")]
    ApiKeyMissing,
    #[error("failed to initialise text-generation provider: {0}")]
    ProviderInit(#[source] LLMError),
    #[error("text generation failed: {0}")]
    Upstream(#[from] LLMError),
    #[error("text generation returned an empty rewrite")]
    EmptyRewrite,
    #[error("usage ledger error: {0}")]
    Ledger(#[from] DatabaseError),
}

impl EnrichmentError {
    /// Message shown to the user whose rewrite failed.
    pub fn client_message(&self) -> String {
        match self {
            EnrichmentError::QuotaExceeded { .. } => {
                "text filter quota exceeded, try again later".to_string()
            }
            EnrichmentError::UnknownFilter(id) => format!("unknown text filter {id}"),
            _ => "text filter failed".to_string(),
        }
    }
}
