use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parley_auth::{AuthSession, Authenticator, IdentityVerifier};
use parley_config::AppConfig;
use parley_database::{
    initialize_database, ChatRepository, MessageRepository, UserRepository,
};
use parley_enrichment::{Enricher, EnrichmentError, OpenRouterGenerator, TextGenerator};
use parley_realtime::{
    push_sender_from_config, Hub, HubDependencies, HubSettings, SqliteMessageStore,
};
use sqlx::SqlitePool;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub authenticator: Authenticator,
    pub enricher: Arc<Enricher>,
    pub hub: Hub,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = Self::open_database(config).await?;

        let authenticator = Authenticator::new(db_pool.clone());
        let users = UserRepository::new(db_pool.clone());
        let chats = ChatRepository::new(db_pool.clone());
        let messages = MessageRepository::new(db_pool.clone());

        let generator = text_generator(config)?;
        let enricher = Arc::new(Enricher::new(
            generator,
            Arc::new(users.clone()),
            config.enrichment.token_ceiling,
        ));

        let push =
            push_sender_from_config(&config.push).context("failed to initialise push client")?;
        let verifier: Arc<dyn IdentityVerifier> = Arc::new(authenticator.clone());

        let hub = Hub::start(
            HubSettings::from_config(config),
            HubDependencies {
                directory: Arc::new(chats.clone()),
                store: Arc::new(SqliteMessageStore::new(messages, chats)),
                recipients: Arc::new(users),
                push,
                enricher: enricher.clone(),
                verifier: Some(verifier),
            },
        );

        info!(
            text_filters = enricher.is_available(),
            token_ceiling = enricher.ceiling(),
            "backend services ready"
        );

        Ok(Self {
            db_pool,
            authenticator,
            enricher,
            hub,
        })
    }

    /// Database only, for maintenance commands that do not serve traffic.
    pub async fn open_database(config: &AppConfig) -> Result<SqlitePool> {
        initialize_database(&config.database)
            .await
            .context("failed to initialise database")
    }

    pub async fn shutdown(&self) {
        self.hub.shutdown(SHUTDOWN_GRACE).await;
        self.db_pool.close().await;
    }
}

fn text_generator(config: &AppConfig) -> Result<Option<Arc<dyn TextGenerator>>> {
    match OpenRouterGenerator::from_config(&config.enrichment) {
        Ok(generator) => {
            let generator: Arc<dyn TextGenerator> = Arc::new(generator);
            Ok(Some(generator))
        }
        Err(EnrichmentError::ApiKeyMissing) => {
            warn!("no OpenRouter API key configured, text filters are unavailable");
            Ok(None)
        }
        Err(error) => Err(error).context("failed to initialise text generation provider"),
    }
}

/// Zero every user's generation usage. Run periodically by an external scheduler.
pub async fn reset_usage(pool: &SqlitePool) -> Result<u64> {
    let reset = UserRepository::new(pool.clone())
        .reset_usage()
        .await
        .context("failed to reset token usage")?;
    info!(users = reset, "token usage reset");
    Ok(reset)
}

/// Mint a session token for an existing user.
pub async fn issue_session(pool: &SqlitePool, user_id: &str, ttl: chrono::Duration) -> Result<AuthSession> {
    Authenticator::new(pool.clone())
        .issue_session(user_id, ttl)
        .await
        .with_context(|| format!("failed to issue session for {user_id}"))
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
