//! Wire format for the chat socket.
//!
//! Inbound frames are `{"type": ..., "data": ...}` envelopes; outbound events
//! are `{"type": ..., "payload": ...}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    /// Overwritten with the session's user id on receipt.
    #[serde(default)]
    pub sender_id: String,
    pub chat_id: String,
    #[serde(default = "Utc::now")]
    pub sent_at: DateTime<Utc>,
    /// `0` delivers the text as written.
    #[serde(default)]
    pub text_filter_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAction {
    pub chat_id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Authentication {
    pub id_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundEvent {
    Message(ChatMessage),
    Action(ChatAction),
    Error { message: String },
}

impl OutboundEvent {
    pub fn error(message: impl Into<String>) -> Self {
        OutboundEvent::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::Message(_) => "message",
            OutboundEvent::Action(_) => "action",
            OutboundEvent::Error { .. } => "error",
        }
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Message(ChatMessage),
    Action(ChatAction),
    Authentication(Authentication),
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(ProtocolError::InvalidEnvelope)?;

        match envelope.kind.as_str() {
            "message" => {
                let message: ChatMessage = payload("message", envelope.data)?;
                require("message", "id", &message.id)?;
                require("message", "chat_id", &message.chat_id)?;
                Ok(InboundFrame::Message(message))
            }
            "action" => {
                let action: ChatAction = payload("action", envelope.data)?;
                require("action", "chat_id", &action.chat_id)?;
                Ok(InboundFrame::Action(action))
            }
            "authentication" => Ok(InboundFrame::Authentication(payload(
                "authentication",
                envelope.data,
            )?)),
            _ => Err(ProtocolError::UnknownKind(envelope.kind)),
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    data: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

fn require(kind: &'static str, field: &'static str, value: &str) -> Result<(), ProtocolError> {
    if value.trim().is_empty() {
        return Err(ProtocolError::MissingField { kind, field });
    }
    Ok(())
}
