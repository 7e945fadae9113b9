//! Real-time message distribution.
//!
//! Sessions read frames from a client and hand messages and actions to four
//! bounded stage queues. Each queue has exactly one consumer: the message
//! dispatcher, the action dispatcher, the persistence worker and the
//! notification worker. Messages that ask for a text filter take a detour
//! through a detached enrichment task before entering the queues.
//!
//! The [`Hub`] owns the [`Registry`], the queues and the workers.

pub mod connection;
pub mod dispatcher;
pub mod enrichment;
pub mod error;
pub mod hub;
pub mod notification;
pub mod persistence;
pub mod pipeline;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod session;
pub mod store;

pub use connection::{ConnectionHandle, Outbox};
pub use dispatcher::{Dispatcher, FanOut};
pub use enrichment::EnrichmentStage;
pub use error::{DeliveryError, HandshakeError, ProtocolError, PushError};
pub use hub::{Hub, HubDependencies, HubSettings};
pub use notification::{
    push_sender_from_config, DisabledPushSender, FcmPushClient, NotificationReport,
    NotificationWorker, PushPayload, PushSender,
};
pub use persistence::PersistenceWorker;
pub use pipeline::{Pipeline, PipelineReceivers};
pub use protocol::{Authentication, ChatAction, ChatMessage, Envelope, InboundFrame, OutboundEvent};
pub use queue::{stage_queue, StageReceiver, StageSender};
pub use registry::Registry;
pub use session::{Admission, Frame, Session};
pub use store::{ChatDirectory, MessageStore, RecipientDirectory, SqliteMessageStore};
