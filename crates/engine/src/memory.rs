//! In-process engine.
//!
//! Clients live entirely in memory: sends are recorded, chats and numbers are
//! seeded by the caller, and lifecycle events are injected with
//! [`MemoryClient::emit`]. Used for local runs without a sidecar and as the
//! engine behind the gateway's tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use {
    anyhow::{Result, bail},
    async_trait::async_trait,
    dashmap::DashMap,
    tracing::debug,
};

use crate::{
    client::{EngineClient, EventSender, MessagingEngine},
    types::{Chat, ChatMessage, ClientInfo, EngineEvent, EngineState, MessageContent},
};

/// Engine whose clients never leave the process.
#[derive(Default)]
pub struct MemoryEngine {
    clients: DashMap<String, Arc<MemoryClient>>,
    auto_pair: bool,
    fail_init: bool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clients report `ready` as soon as they are initialized.
    pub fn auto_pair(mut self) -> Self {
        self.auto_pair = true;
        self
    }

    /// Every `initialize` call fails.
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Latest client created for `session_id`.
    pub fn client(&self, session_id: &str) -> Option<Arc<MemoryClient>> {
        self.clients.get(session_id).map(|c| Arc::clone(c.value()))
    }

    /// Number of clients created so far, live or destroyed.
    pub fn created(&self) -> usize {
        self.clients
            .iter()
            .map(|c| c.value().generation)
            .max()
            .unwrap_or(0)
    }
}

impl MessagingEngine for MemoryEngine {
    fn id(&self) -> &str {
        "memory"
    }

    fn create_client(&self, session_id: &str, events: EventSender) -> Arc<dyn EngineClient> {
        let generation = self.created() + 1;
        let client = Arc::new(MemoryClient {
            session_id: session_id.to_string(),
            generation,
            events,
            auto_pair: self.auto_pair,
            fail_init: self.fail_init,
            state: Mutex::new(MemoryState::default()),
        });
        self.clients
            .insert(session_id.to_string(), Arc::clone(&client));
        client
    }
}

#[derive(Default)]
struct MemoryState {
    initialized: bool,
    connection: Option<EngineState>,
    logged_out: bool,
    destroyed: bool,
    info: Option<ClientInfo>,
    sent: Vec<(String, MessageContent)>,
    chats: Vec<Chat>,
    messages: HashMap<String, Vec<ChatMessage>>,
    numbers: HashMap<String, String>,
    fetch_limits: Vec<usize>,
}

/// A client of [`MemoryEngine`].
pub struct MemoryClient {
    session_id: String,
    generation: usize,
    events: EventSender,
    auto_pair: bool,
    fail_init: bool,
    state: Mutex<MemoryState>,
}

impl MemoryClient {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 1-based creation order within the engine.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Deliver an event to the owning session. Returns false once nobody listens.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Mark the client paired and report `ready`.
    pub fn pair(&self, info: ClientInfo) -> bool {
        {
            let mut state = self.state();
            state.connection = Some(EngineState::Connected);
            state.info = Some(info);
        }
        self.emit(EngineEvent::Ready)
    }

    pub fn set_connection_state(&self, connection: Option<EngineState>) {
        self.state().connection = connection;
    }

    pub fn add_chat(&self, chat: Chat, messages: Vec<ChatMessage>) {
        let mut state = self.state();
        state.messages.insert(chat.id.clone(), messages);
        state.chats.push(chat);
    }

    pub fn register_number(&self, number: &str, chat_id: &str) {
        self.state()
            .numbers
            .insert(number.to_string(), chat_id.to_string());
    }

    /// Everything sent through this client, in order.
    pub fn sent(&self) -> Vec<(String, MessageContent)> {
        self.state().sent.clone()
    }

    /// The `limit` of every `fetch_messages` call, in order.
    pub fn fetch_limits(&self) -> Vec<usize> {
        self.state().fetch_limits.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    pub fn is_logged_out(&self) -> bool {
        self.state().logged_out
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.state().destroyed {
            bail!("client {} was destroyed", self.session_id);
        }
        Ok(())
    }
}

#[async_trait]
impl EngineClient for MemoryClient {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn initialize(&self) -> Result<()> {
        if self.fail_init {
            bail!("memory engine configured to fail initialization");
        }
        self.state().initialized = true;
        debug!(session = %self.session_id, "memory client initialized");
        if self.auto_pair {
            self.pair(ClientInfo {
                wid: format!("{}@c.us", self.session_id),
                pushname: self.session_id.clone(),
                platform: "memory".into(),
            });
        }
        Ok(())
    }

    async fn connection_state(&self) -> Result<Option<EngineState>> {
        Ok(self.state().connection.clone())
    }

    async fn logout(&self) -> Result<()> {
        let mut state = self.state();
        state.logged_out = true;
        state.connection = Some(EngineState::Unpaired);
        state.info = None;
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        let mut state = self.state();
        state.destroyed = true;
        state.connection = None;
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, content: MessageContent) -> Result<()> {
        self.ensure_alive()?;
        self.state().sent.push((chat_id.to_string(), content));
        Ok(())
    }

    async fn resolve_number(&self, number: &str) -> Result<Option<String>> {
        self.ensure_alive()?;
        Ok(self.state().numbers.get(number).cloned())
    }

    async fn list_chats(&self) -> Result<Vec<Chat>> {
        self.ensure_alive()?;
        Ok(self.state().chats.clone())
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        self.ensure_alive()?;
        Ok(self.state().chats.iter().find(|c| c.id == chat_id).cloned())
    }

    async fn fetch_messages(&self, chat: &Chat, limit: usize) -> Result<Vec<ChatMessage>> {
        self.ensure_alive()?;
        let mut state = self.state();
        state.fetch_limits.push(limit);
        let all = state.messages.get(&chat.id).cloned().unwrap_or_default();
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn info(&self) -> Result<Option<ClientInfo>> {
        Ok(self.state().info.clone())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, tokio::sync::mpsc};

    #[tokio::test]
    async fn auto_pair_reports_ready() {
        let engine = MemoryEngine::new().auto_pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = engine.create_client("dev", tx);
        client.initialize().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), EngineEvent::Ready);
        assert_eq!(
            client.connection_state().await.unwrap(),
            Some(EngineState::Connected)
        );
        assert_eq!(client.info().await.unwrap().unwrap().wid, "dev@c.us");
    }

    #[tokio::test]
    async fn fetch_returns_most_recent_messages() {
        let engine = MemoryEngine::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = engine.create_client("s", tx);
        let handle = engine.client("s").unwrap();
        let chat = Chat {
            id: "1@c.us".into(),
            ..Chat::default()
        };
        let messages = (0..4)
            .map(|i| ChatMessage {
                id: format!("m{i}"),
                ..ChatMessage::default()
            })
            .collect();
        handle.add_chat(chat.clone(), messages);

        let got = client.fetch_messages(&chat, 2).await.unwrap();
        let ids: Vec<_> = got.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m2", "m3"]);
        assert_eq!(handle.fetch_limits(), vec![2]);
    }

    #[tokio::test]
    async fn destroyed_client_rejects_sends() {
        let engine = MemoryEngine::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = engine.create_client("s", tx);
        client.destroy().await.unwrap();
        let err = client
            .send_message("1@c.us", MessageContent::Text { body: "x".into() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("destroyed"));
    }

    #[test]
    fn recreating_a_client_bumps_generation() {
        let engine = MemoryEngine::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        engine.create_client("s", tx.clone());
        engine.create_client("s", tx);
        assert_eq!(engine.created(), 2);
    }

    #[tokio::test]
    async fn failing_init() {
        let engine = MemoryEngine::new().failing_init();
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = engine.create_client("s", tx);
        assert!(client.initialize().await.is_err());
    }
}
