use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use parley_auth::IdentityVerifier;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::enrichment::EnrichmentStage;
use crate::error::{HandshakeError, ProtocolError};
use crate::pipeline::Pipeline;
use crate::protocol::{InboundFrame, OutboundEvent};
use crate::registry::Registry;

/// A frame read from the client, already stripped of transport noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Must hold UTF-8 JSON, like a text frame.
    Binary(Vec<u8>),
    Close,
}

/// How the session proves who it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Identity already established (verified upgrade token, or
    /// authentication disabled).
    Authenticated,
    /// The first frame must be an `authentication` frame.
    Handshake,
}

/// Ingress loop for one connection.
///
/// `Connecting → (Authenticating) → Active → Closed`. The session is only
/// registered once active, and on close it releases its own registry entry
/// and cancels any enrichment it started.
pub struct Session {
    pub(crate) user_id: String,
    pub(crate) handle: ConnectionHandle,
    pub(crate) cancel: CancellationToken,
    pub(crate) admission: Admission,
    pub(crate) handshake_timeout: Duration,
    pub(crate) registry: Registry,
    pub(crate) pipeline: Pipeline,
    pub(crate) enrichment: EnrichmentStage,
    pub(crate) verifier: Option<Arc<dyn IdentityVerifier>>,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub async fn run<S, E>(self, mut frames: S)
    where
        S: Stream<Item = Result<Frame, E>> + Unpin + Send,
        E: Display + Send,
    {
        let connection_id = self.handle.id();

        if self.admission == Admission::Handshake {
            if let Err(error) = self.authenticate(&mut frames).await {
                warn!(user_id = %self.user_id, connection_id, %error, "handshake failed");
                self.report(OutboundEvent::error(error.to_string()));
                self.cancel.cancel();
                self.handle.close();
                return;
            }
        }

        self.registry.register(&self.user_id, self.handle.clone()).await;
        info!(user_id = %self.user_id, connection_id, "session active");

        let reason = self.read_loop(&mut frames).await;

        self.cancel.cancel();
        self.registry.release(&self.user_id, connection_id).await;
        self.handle.close();
        info!(user_id = %self.user_id, connection_id, reason, "session closed");
    }

    async fn authenticate<S, E>(&self, frames: &mut S) -> Result<(), HandshakeError>
    where
        S: Stream<Item = Result<Frame, E>> + Unpin + Send,
        E: Display + Send,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(HandshakeError::Disconnected),
            outcome = tokio::time::timeout(self.handshake_timeout, self.handshake(frames)) => {
                outcome.unwrap_or(Err(HandshakeError::Timeout))
            }
        }
    }

    async fn handshake<S, E>(&self, frames: &mut S) -> Result<(), HandshakeError>
    where
        S: Stream<Item = Result<Frame, E>> + Unpin + Send,
        E: Display + Send,
    {
        let text = match frames.next().await {
            Some(Ok(Frame::Text(text))) => text,
            Some(Ok(Frame::Binary(bytes))) => decode(bytes)?,
            Some(Ok(Frame::Close)) | None => return Err(HandshakeError::Disconnected),
            Some(Err(error)) => {
                debug!(user_id = %self.user_id, %error, "read failed during handshake");
                return Err(HandshakeError::Disconnected);
            }
        };

        let credential = match InboundFrame::parse(&text)? {
            InboundFrame::Authentication(auth) => auth.id_token,
            _ => return Err(HandshakeError::ExpectedAuthentication),
        };

        let verifier = self
            .verifier
            .as_ref()
            .ok_or(HandshakeError::VerifierUnavailable)?;
        let principal = verifier.verify(&credential).await?;
        if principal != self.user_id {
            return Err(HandshakeError::PrincipalMismatch);
        }
        Ok(())
    }

    async fn read_loop<S, E>(&self, frames: &mut S) -> &'static str
    where
        S: Stream<Item = Result<Frame, E>> + Unpin + Send,
        E: Display + Send,
    {
        loop {
            let frame = tokio::select! {
                _ = self.handle.closed() => return "connection closed",
                _ = self.cancel.cancelled() => return "server shutting down",
                frame = frames.next() => frame,
            };

            match frame {
                Some(Ok(Frame::Text(text))) => self.dispatch(&text).await,
                Some(Ok(Frame::Binary(bytes))) => match decode(bytes) {
                    Ok(text) => self.dispatch(&text).await,
                    Err(error) => self.reject(error),
                },
                Some(Ok(Frame::Close)) | None => return "client disconnected",
                Some(Err(error)) => {
                    debug!(user_id = %self.user_id, %error, "read failed");
                    return "read error";
                }
            }
        }
    }

    async fn dispatch(&self, text: &str) {
        match InboundFrame::parse(text) {
            Ok(InboundFrame::Message(mut message)) => {
                message.sender_id = self.user_id.clone();
                if message.text_filter_id == 0 {
                    if let Err(error) = self.pipeline.forward_message(message).await {
                        warn!(user_id = %self.user_id, %error, "failed to forward message");
                    }
                } else {
                    self.enrichment
                        .spawn(message, self.handle.clone(), self.cancel.child_token());
                }
            }
            Ok(InboundFrame::Action(action)) => {
                if let Err(error) = self.pipeline.forward_action(action).await {
                    warn!(user_id = %self.user_id, %error, "failed to forward action");
                }
            }
            Ok(InboundFrame::Authentication(_)) => {
                self.reject(ProtocolError::UnexpectedAuthentication)
            }
            Err(error) => self.reject(error),
        }
    }

    fn reject(&self, error: ProtocolError) {
        debug!(user_id = %self.user_id, %error, "rejected frame");
        self.report(OutboundEvent::error(error.to_string()));
    }

    fn report(&self, event: OutboundEvent) {
        if let Err(error) = self.handle.try_deliver(event) {
            debug!(user_id = %self.user_id, %error, "could not deliver error event");
        }
    }
}

fn decode(bytes: Vec<u8>) -> Result<String, ProtocolError> {
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidEncoding)
}
