use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parley_auth::IdentityVerifier;
use parley_config::{AppConfig, EnrichmentFailurePolicy, PipelineConfig};
use parley_enrichment::Enricher;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::connection::{ConnectionHandle, Outbox};
use crate::dispatcher::Dispatcher;
use crate::enrichment::EnrichmentStage;
use crate::error::HandshakeError;
use crate::notification::{NotificationWorker, PushSender};
use crate::persistence::PersistenceWorker;
use crate::pipeline::{self, Pipeline};
use crate::registry::Registry;
use crate::session::{Admission, Session};
use crate::store::{ChatDirectory, MessageStore, RecipientDirectory};

#[derive(Debug, Clone)]
pub struct HubSettings {
    pub handshake_timeout: Duration,
    pub outbound_buffer: usize,
    pub require_authentication: bool,
    pub failure_policy: EnrichmentFailurePolicy,
    pub pipeline: PipelineConfig,
}

impl HubSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            handshake_timeout: Duration::from_secs(config.realtime.handshake_timeout_seconds),
            outbound_buffer: config.realtime.outbound_buffer,
            require_authentication: config.realtime.require_authentication,
            failure_policy: config.enrichment.failure_policy,
            pipeline: config.pipeline.clone(),
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Everything the hub talks to outside the process.
#[derive(Clone)]
pub struct HubDependencies {
    pub directory: Arc<dyn ChatDirectory>,
    pub store: Arc<dyn MessageStore>,
    pub recipients: Arc<dyn RecipientDirectory>,
    pub push: Arc<dyn PushSender>,
    pub enricher: Arc<Enricher>,
    pub verifier: Option<Arc<dyn IdentityVerifier>>,
}

/// Owns the registry, the stage queues and their workers.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    registry: Registry,
    pipeline: Pipeline,
    enrichment: EnrichmentStage,
    verifier: Option<Arc<dyn IdentityVerifier>>,
    settings: HubSettings,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Hub {
    /// Build the queues and spawn the four stage workers. Must be called from
    /// within a Tokio runtime.
    pub fn start(settings: HubSettings, deps: HubDependencies) -> Self {
        let registry = Registry::new();
        let shutdown = CancellationToken::new();
        let (pipeline, receivers) = pipeline::channel(&settings.pipeline);

        let dispatcher = Dispatcher::new(registry.clone(), deps.directory);
        let persistence = PersistenceWorker::new(deps.store);
        let notifications = NotificationWorker::new(deps.recipients, deps.push);

        let workers = vec![
            tokio::spawn(
                dispatcher
                    .clone()
                    .run_messages(receivers.messages, shutdown.clone()),
            ),
            tokio::spawn(dispatcher.run_actions(receivers.actions, shutdown.clone())),
            tokio::spawn(persistence.run(receivers.persistence, shutdown.clone())),
            tokio::spawn(notifications.run(receivers.notifications, shutdown.clone())),
        ];

        let enrichment =
            EnrichmentStage::new(deps.enricher, settings.failure_policy, pipeline.clone());

        info!(
            require_authentication = settings.require_authentication,
            failure_policy = ?settings.failure_policy,
            "realtime hub started"
        );

        Self {
            inner: Arc::new(HubInner {
                registry,
                pipeline,
                enrichment,
                verifier: deps.verifier,
                settings,
                shutdown,
                workers: Mutex::new(workers),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    pub fn settings(&self) -> &HubSettings {
        &self.inner.settings
    }

    pub fn requires_authentication(&self) -> bool {
        self.inner.settings.require_authentication
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Resolve a credential to its principal, for checks made before a
    /// session exists.
    pub async fn verify(&self, credential: &str) -> Result<String, HandshakeError> {
        let verifier = self
            .inner
            .verifier
            .as_ref()
            .ok_or(HandshakeError::VerifierUnavailable)?;
        Ok(verifier.verify(credential).await?)
    }

    /// Create the session for a new connection. The caller drives
    /// [`Session::run`] with the connection's frames and writes whatever the
    /// [`Outbox`] yields back to the client.
    pub fn open_session(&self, user_id: impl Into<String>, admission: Admission) -> (Session, Outbox) {
        let (handle, outbox) = ConnectionHandle::new(self.inner.settings.outbound_buffer);
        let session = Session {
            user_id: user_id.into(),
            handle,
            cancel: self.inner.shutdown.child_token(),
            admission,
            handshake_timeout: self.inner.settings.handshake_timeout,
            registry: self.inner.registry.clone(),
            pipeline: self.inner.pipeline.clone(),
            enrichment: self.inner.enrichment.clone(),
            verifier: self.inner.verifier.clone(),
        };
        (session, outbox)
    }

    /// Close every connection, then let the workers drain what is already
    /// queued. Workers still running after `grace` are left to the runtime.
    pub async fn shutdown(&self, grace: Duration) {
        let closed = self.inner.registry.close_all().await;
        self.inner.shutdown.cancel();

        let workers = std::mem::take(&mut *self.inner.workers.lock().await);
        match tokio::time::timeout(grace, join_all(workers)).await {
            Ok(results) => {
                for result in results {
                    if let Err(err) = result {
                        error!(error = %err, "pipeline worker failed");
                    }
                }
            }
            Err(_) => warn!(?grace, "pipeline workers did not drain in time"),
        }

        info!(closed, "realtime hub stopped");
    }
}
