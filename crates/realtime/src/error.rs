use parley_auth::AuthError;
use thiserror::Error;

/// A frame the session could not interpret. Never fatal to the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid frame: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),
    #[error("unknown frame type `{0}`")]
    UnknownKind(String),
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} payload is missing `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("binary frame is not valid UTF-8")]
    InvalidEncoding,
    #[error("already authenticated")]
    UnexpectedAuthentication,
}

/// Why a connection never became active.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("authentication timed out")]
    Timeout,
    #[error("connection closed before authenticating")]
    Disconnected,
    #[error("first frame must be an authentication frame")]
    ExpectedAuthentication,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("authentication failed: {0}")]
    Rejected(#[from] AuthError),
    #[error("credential does not belong to this user")]
    PrincipalMismatch,
    #[error("authentication is unavailable")]
    VerifierUnavailable,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection {0} outbound buffer is full")]
    BufferFull(u64),
    #[error("connection {0} is closed")]
    ConnectionClosed(u64),
    #[error("{0} queue is closed")]
    QueueClosed(&'static str),
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("push service rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
