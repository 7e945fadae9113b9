//! Shared fakes and a client harness for the realtime integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use parley_auth::{AuthError, IdentityVerifier};
use parley_database::DatabaseError;
use parley_enrichment::{Enricher, EnrichmentError, Generation, TextGenerator, UsageLedger};
use parley_realtime::{
    Admission, ChatDirectory, ChatMessage, ConnectionHandle, Frame, Hub, HubDependencies,
    HubSettings, MessageStore, OutboundEvent, Outbox, PushError, PushPayload, PushSender,
    RecipientDirectory, Registry,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

pub const CEILING: u32 = 1_000;
const WAIT: Duration = Duration::from_secs(2);

#[derive(Default)]
pub struct InMemoryDirectory {
    chats: Mutex<HashMap<String, Vec<String>>>,
    broken: Mutex<HashSet<String>>,
}

impl InMemoryDirectory {
    pub fn add_chat(&self, chat_id: &str, members: &[&str]) {
        self.chats.lock().unwrap().insert(
            chat_id.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
    }

    pub fn break_chat(&self, chat_id: &str) {
        self.broken.lock().unwrap().insert(chat_id.to_string());
    }
}

#[async_trait]
impl ChatDirectory for InMemoryDirectory {
    async fn members(&self, chat_id: &str) -> Result<Vec<String>, DatabaseError> {
        if self.broken.lock().unwrap().contains(chat_id) {
            return Err(DatabaseError::QueryError("membership lookup failed".into()));
        }
        Ok(self
            .chats
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct RecordingStore {
    messages: Mutex<Vec<ChatMessage>>,
    touched: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl RecordingStore {
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn touched(&self) -> Vec<String> {
        self.touched
            .lock()
            .unwrap()
            .iter()
            .map(|(chat, _)| chat.clone())
            .collect()
    }
}

#[async_trait]
impl MessageStore for RecordingStore {
    async fn insert_message(
        &self,
        message: &ChatMessage,
        stored_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut messages = self.messages.lock().unwrap();
        if messages.iter().any(|m| m.id == message.id) {
            return Ok(false);
        }
        messages.push(ChatMessage {
            sent_at: stored_at,
            ..message.clone()
        });
        Ok(true)
    }

    async fn touch_chat(&self, chat_id: &str, at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        self.touched.lock().unwrap().push((chat_id.to_string(), at));
        Ok(true)
    }
}

#[derive(Default)]
pub struct FakeRecipients {
    tokens: Mutex<HashMap<String, Vec<(String, String)>>>,
    names: Mutex<HashMap<String, String>>,
}

impl FakeRecipients {
    pub fn add_token(&self, chat_id: &str, user_id: &str, token: &str) {
        self.tokens
            .lock()
            .unwrap()
            .entry(chat_id.to_string())
            .or_default()
            .push((user_id.to_string(), token.to_string()));
    }

    pub fn set_name(&self, user_id: &str, name: &str) {
        self.names
            .lock()
            .unwrap()
            .insert(user_id.to_string(), name.to_string());
    }
}

#[async_trait]
impl RecipientDirectory for FakeRecipients {
    async fn push_tokens(
        &self,
        chat_id: &str,
        exclude_user_id: &str,
    ) -> Result<Vec<String>, DatabaseError> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .get(chat_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(user, _)| user != exclude_user_id)
                    .map(|(_, token)| token.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn display_name(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self.names.lock().unwrap().get(user_id).cloned())
    }
}

#[derive(Default)]
pub struct RecordingPush {
    sent: Mutex<Vec<(String, PushPayload)>>,
    attempts: AtomicUsize,
    failing: Mutex<HashSet<String>>,
}

impl RecordingPush {
    pub fn fail_token(&self, token: &str) {
        self.failing.lock().unwrap().insert(token.to_string());
    }

    pub fn sent(&self) -> Vec<(String, PushPayload)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushSender for RecordingPush {
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<(), PushError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(token) {
            return Err(PushError::Rejected {
                status: 404,
                body: "UNREGISTERED".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((token.to_string(), payload.clone()));
        Ok(())
    }
}

/// Prefixes the original text with "Arr, ". An empty reply counts as a failed
/// rewrite. With a gate set, each call waits for one `release`.
pub struct FakeGenerator {
    calls: AtomicUsize,
    failing: Mutex<bool>,
    gate: Mutex<Option<Arc<Notify>>>,
    tokens: u32,
}

impl Default for FakeGenerator {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: Mutex::new(false),
            gate: Mutex::new(None),
            tokens: 42,
        }
    }
}

impl FakeGenerator {
    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }

    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<Generation, EnrichmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if *self.failing.lock().unwrap() {
            return Ok(Generation {
                text: String::new(),
                tokens_used: 0,
            });
        }

        let original = prompt
            .rsplit_once(": '")
            .map(|(_, rest)| rest.trim_end_matches('\''))
            .unwrap_or(prompt);
        Ok(Generation {
            text: format!("Arr, {original}"),
            tokens_used: self.tokens,
        })
    }
}

#[derive(Default)]
pub struct FakeLedger {
    usage: Mutex<HashMap<String, i64>>,
}

impl FakeLedger {
    pub fn set(&self, user_id: &str, used: i64) {
        self.usage.lock().unwrap().insert(user_id.to_string(), used);
    }

    pub fn usage_of(&self, user_id: &str) -> i64 {
        self.usage
            .lock()
            .unwrap()
            .get(user_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl UsageLedger for FakeLedger {
    async fn used(&self, user_id: &str) -> Result<i64, DatabaseError> {
        Ok(self.usage_of(user_id))
    }

    async fn record(&self, user_id: &str, tokens: u32) -> Result<(), DatabaseError> {
        *self
            .usage
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_insert(0) += i64::from(tokens);
        Ok(())
    }
}

/// Maps credentials straight to principals.
#[derive(Default)]
pub struct StaticVerifier {
    credentials: Mutex<HashMap<String, String>>,
}

impl StaticVerifier {
    pub fn allow(&self, credential: &str, user_id: &str) {
        self.credentials
            .lock()
            .unwrap()
            .insert(credential.to_string(), user_id.to_string());
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, credential: &str) -> Result<String, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        self.credentials
            .lock()
            .unwrap()
            .get(credential)
            .cloned()
            .ok_or(AuthError::SessionNotFound)
    }
}

pub struct Harness {
    pub hub: Hub,
    pub directory: Arc<InMemoryDirectory>,
    pub store: Arc<RecordingStore>,
    pub recipients: Arc<FakeRecipients>,
    pub push: Arc<RecordingPush>,
    pub generator: Arc<FakeGenerator>,
    pub ledger: Arc<FakeLedger>,
    pub verifier: Arc<StaticVerifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(HubSettings::default())
    }

    pub fn with_settings(settings: HubSettings) -> Self {
        let directory = Arc::new(InMemoryDirectory::default());
        let store = Arc::new(RecordingStore::default());
        let recipients = Arc::new(FakeRecipients::default());
        let push = Arc::new(RecordingPush::default());
        let generator = Arc::new(FakeGenerator::default());
        let ledger = Arc::new(FakeLedger::default());
        let verifier = Arc::new(StaticVerifier::default());

        let text_generator: Arc<dyn TextGenerator> = generator.clone();
        let usage: Arc<dyn UsageLedger> = ledger.clone();
        let identity: Arc<dyn IdentityVerifier> = verifier.clone();

        let deps = HubDependencies {
            directory: directory.clone(),
            store: store.clone(),
            recipients: recipients.clone(),
            push: push.clone(),
            enricher: Arc::new(Enricher::new(Some(text_generator), usage, CEILING)),
            verifier: Some(identity),
        };

        Self {
            hub: Hub::start(settings, deps),
            directory,
            store,
            recipients,
            push,
            generator,
            ledger,
            verifier,
        }
    }

    pub fn registry(&self) -> &Registry {
        self.hub.registry()
    }

    /// Connect an already-authenticated client and wait until it is registered.
    pub async fn connect(&self, user_id: &str) -> TestClient {
        let client = self.open(user_id, Admission::Authenticated);
        wait_for_connection(self.registry(), user_id, Some(client.handle.id())).await;
        client
    }

    pub fn open(&self, user_id: &str, admission: Admission) -> TestClient {
        let (session, outbox) = self.hub.open_session(user_id, admission);
        let handle = session.handle().clone();
        let (frames, rx) = mpsc::unbounded_channel::<Result<Frame, String>>();

        let stream: Pin<Box<dyn Stream<Item = Result<Frame, String>> + Send>> =
            Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|frame| (frame, rx))
            }));
        let task = tokio::spawn(session.run(stream));

        TestClient {
            user_id: user_id.to_string(),
            handle,
            frames: Some(frames),
            outbox,
            task,
        }
    }
}

pub struct TestClient {
    pub user_id: String,
    pub handle: ConnectionHandle,
    frames: Option<mpsc::UnboundedSender<Result<Frame, String>>>,
    outbox: Outbox,
    task: JoinHandle<()>,
}

impl TestClient {
    pub fn send_raw(&self, text: &str) {
        if let Some(frames) = &self.frames {
            let _ = frames.send(Ok(Frame::Text(text.to_string())));
        }
    }

    pub fn send_binary(&self, bytes: &[u8]) {
        if let Some(frames) = &self.frames {
            let _ = frames.send(Ok(Frame::Binary(bytes.to_vec())));
        }
    }

    pub fn send_json(&self, value: Value) {
        self.send_raw(&value.to_string());
    }

    pub fn send_message(&self, id: &str, chat_id: &str, text: &str, filter: i32) {
        self.send_json(json!({
            "type": "message",
            "data": {"id": id, "text": text, "chat_id": chat_id, "text_filter_id": filter}
        }));
    }

    pub fn authenticate(&self, credential: &str) {
        self.send_json(json!({"type": "authentication", "data": {"id_token": credential}}));
    }

    /// End the frame stream, as a dropped socket would.
    pub fn disconnect(&mut self) {
        self.frames.take();
    }

    pub fn fail_read(&self) {
        if let Some(frames) = &self.frames {
            let _ = frames.send(Err("connection reset by peer".to_string()));
        }
    }

    pub async fn next_event(&mut self) -> OutboundEvent {
        match tokio::time::timeout(WAIT, self.outbox.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => panic!("{}: connection closed while waiting for an event", self.user_id),
            Err(_) => panic!("{}: timed out waiting for an event", self.user_id),
        }
    }

    pub async fn next_message(&mut self) -> ChatMessage {
        match self.next_event().await {
            OutboundEvent::Message(message) => message,
            other => panic!("{}: expected a message, got {other:?}", self.user_id),
        }
    }

    pub async fn next_error(&mut self) -> String {
        match self.next_event().await {
            OutboundEvent::Error { message } => message,
            other => panic!("{}: expected an error, got {other:?}", self.user_id),
        }
    }

    pub async fn expect_silence(&mut self) {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(150), self.outbox.recv()).await
        {
            panic!("{}: unexpected event {event:?}", self.user_id);
        }
    }

    /// Wait for the outbox to report the connection closed and drained.
    pub async fn expect_closed(&mut self) {
        loop {
            match tokio::time::timeout(WAIT, self.outbox.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return,
                Err(_) => panic!("{}: connection was not closed", self.user_id),
            }
        }
    }

    pub async fn finished(self) {
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("session did not finish")
            .expect("session task panicked");
    }
}

pub async fn wait_for_connection(registry: &Registry, user_id: &str, expected: Option<u64>) {
    let deadline = Instant::now() + WAIT;
    while registry.connection_id(user_id).await != expected {
        assert!(
            Instant::now() < deadline,
            "registry entry for {user_id} never became {expected:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
