use std::sync::Arc;

use {anyhow::Result, async_trait::async_trait, tokio::sync::mpsc};

use crate::types::{Chat, ChatMessage, ClientInfo, EngineEvent, EngineState, MessageContent};

/// Channel a client uses to push lifecycle events to its owning session.
pub type EventSender = mpsc::UnboundedSender<EngineEvent>;

/// Factory for engine clients. One engine serves every session.
pub trait MessagingEngine: Send + Sync {
    /// Driver identifier (e.g. "bridge", "memory").
    fn id(&self) -> &str;

    /// Create a client scoped by `session_id`.
    ///
    /// The id is the unit of credential persistence on the engine side:
    /// creating a client with the same id again resumes the same identity.
    /// Creation must not block; connecting happens in [`EngineClient::initialize`].
    fn create_client(&self, session_id: &str, events: EventSender) -> Arc<dyn EngineClient>;
}

/// One external client handle. Owned by exactly one session.
#[async_trait]
pub trait EngineClient: Send + Sync {
    fn session_id(&self) -> &str;

    /// Launch the client. Pairing progress is reported through events.
    async fn initialize(&self) -> Result<()>;

    /// Current connection state, `None` when the client is not launched yet.
    async fn connection_state(&self) -> Result<Option<EngineState>>;

    /// Unpair the device. Persisted credentials are dropped.
    async fn logout(&self) -> Result<()>;

    /// Release every resource held for this client.
    async fn destroy(&self) -> Result<()>;

    async fn send_message(&self, chat_id: &str, content: MessageContent) -> Result<()>;

    /// Look a phone number up, returning its chat id when it is registered.
    async fn resolve_number(&self, number: &str) -> Result<Option<String>>;

    async fn list_chats(&self) -> Result<Vec<Chat>>;

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>>;

    /// Most recent messages of `chat`, at most `limit`.
    async fn fetch_messages(&self, chat: &Chat, limit: usize) -> Result<Vec<ChatMessage>>;

    /// Identity of the paired account, if paired.
    async fn info(&self) -> Result<Option<ClientInfo>>;
}
