use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    anyhow::Result,
    serde::Deserialize,
    tokio::{
        sync::{Mutex, RwLock, mpsc},
        task::JoinHandle,
    },
    tracing::{debug, error, info, warn},
    wagate_engine::{
        Chat, ChatMessage, ClientInfo, EngineClient, EngineEvent, EngineState, MessageContent,
        MessagingEngine, Poll,
    },
};

use crate::{
    name::SessionName,
    status::{SessionStatus, Trigger},
    webhook::{WebhookEvent, WebhookSink},
};

/// A chat id is `localpart@domain` with a non-empty local part.
pub fn is_valid_chat_id(chat_id: &str) -> bool {
    chat_id.find('@').is_some_and(|at| at > 0)
}

/// Poll as requested by API callers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSpec {
    pub name: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub multiple_answers: bool,
}

impl PollSpec {
    fn into_poll(self) -> Poll {
        let multiple_answers = self.multiple_answers;
        let mut poll = Poll::new(self.name, self.options);
        if multiple_answers {
            poll.allow_multiple_answers = true;
        }
        poll
    }
}

// ── Lifecycle state ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Lifecycle {
    status: SessionStatus,
    qr_value: Option<String>,
}

impl Lifecycle {
    fn apply(&mut self, trigger: &Trigger) -> SessionStatus {
        self.status = self.status.next(trigger);
        match trigger {
            Trigger::Engine(EngineEvent::QrReceived { value }) => {
                self.qr_value = Some(value.clone());
            },
            _ if self.status != SessionStatus::ScanQrCode => self.qr_value = None,
            _ => {},
        }
        self.status
    }
}

/// The part of a session its event pump needs.
struct SessionCore {
    name: SessionName,
    webhook_url: Option<String>,
    webhooks: WebhookSink,
    lifecycle: RwLock<Lifecycle>,
}

impl SessionCore {
    async fn handle(&self, trigger: Trigger) {
        let (before, after) = {
            let mut lifecycle = self.lifecycle.write().await;
            let before = lifecycle.status;
            (before, lifecycle.apply(&trigger))
        };

        match &trigger {
            Trigger::Engine(EngineEvent::Ready) => info!(session = %self.name, "session is ready"),
            Trigger::Engine(EngineEvent::QrReceived { value }) => {
                info!(session = %self.name, qr = %value, "QR code received, scan it with the phone")
            },
            Trigger::Engine(EngineEvent::StateChanged { state }) => {
                debug!(session = %self.name, %state, "engine state changed")
            },
            Trigger::Engine(EngineEvent::MessageReceived { message }) => {
                debug!(session = %self.name, from = %message.from, "message received")
            },
            Trigger::InitFailed(reason) => {
                error!(session = %self.name, reason = %reason, "engine client failed to initialize")
            },
        }
        if before != after {
            info!(session = %self.name, from = %before, to = %after, "session status changed");
        }

        if let Some(url) = &self.webhook_url {
            self.webhooks
                .dispatch(url, WebhookEvent::for_trigger(&self.name, &trigger, after));
        }
    }
}

/// Initialize the client, then apply its events one at a time.
async fn pump(
    core: Arc<SessionCore>,
    client: Arc<dyn EngineClient>,
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
) {
    let mut init = client.initialize();
    let mut initializing = true;

    loop {
        tokio::select! {
            result = &mut init, if initializing => {
                initializing = false;
                if let Err(e) = result {
                    core.handle(Trigger::InitFailed(format!("{e:#}"))).await;
                }
            },
            event = events.recv() => match event {
                Some(event) => core.handle(Trigger::Engine(event)).await,
                None => break,
            },
        }
    }
    debug!(session = %core.name, "event pump stopped");
}

// ── Session ─────────────────────────────────────────────────────────────────

/// One named messaging identity bound to an exclusively owned engine client.
pub struct MessagingSession {
    core: Arc<SessionCore>,
    client: Arc<dyn EngineClient>,
    pump: Mutex<Option<JoinHandle<()>>>,
    released: AtomicBool,
}

impl MessagingSession {
    /// Create the engine client and launch it in the background.
    ///
    /// Never fails: launch errors only show up as a `FAILED` status.
    pub fn start(
        name: SessionName,
        webhook_url: Option<String>,
        engine: &dyn MessagingEngine,
        webhooks: WebhookSink,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = engine.create_client(name.as_str(), tx);
        let core = Arc::new(SessionCore {
            name,
            webhook_url,
            webhooks,
            lifecycle: RwLock::new(Lifecycle::default()),
        });
        let handle = tokio::spawn(pump(Arc::clone(&core), Arc::clone(&client), rx));

        Arc::new(Self {
            core,
            client,
            pump: Mutex::new(Some(handle)),
            released: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &SessionName {
        &self.core.name
    }

    pub fn webhook_url(&self) -> Option<&str> {
        self.core.webhook_url.as_deref()
    }

    pub async fn state(&self) -> SessionStatus {
        self.core.lifecycle.read().await.status
    }

    /// Status together with the QR payload waiting to be scanned, if any.
    pub async fn qr(&self) -> (SessionStatus, Option<String>) {
        let lifecycle = self.core.lifecycle.read().await;
        (lifecycle.status, lifecycle.qr_value.clone())
    }

    /// Send a text message. An invalid `chat_id` is ignored.
    pub async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        if !is_valid_chat_id(chat_id) {
            debug!(session = %self.core.name, chat_id, "ignoring text to invalid chat id");
            return Ok(());
        }
        self.client
            .send_message(chat_id, MessageContent::Text {
                body: text.to_string(),
            })
            .await
    }

    /// Send a poll. An invalid `chat_id` is ignored.
    pub async fn send_poll(&self, chat_id: &str, spec: PollSpec) -> Result<()> {
        if !is_valid_chat_id(chat_id) {
            debug!(session = %self.core.name, chat_id, "ignoring poll to invalid chat id");
            return Ok(());
        }
        self.client
            .send_message(chat_id, MessageContent::Poll(spec.into_poll()))
            .await
    }

    pub async fn resolve_number(&self, number: &str) -> Result<Option<String>> {
        self.client.resolve_number(number).await
    }

    pub async fn info(&self) -> Result<Option<ClientInfo>> {
        self.client.info().await
    }

    pub async fn chats(&self) -> Result<Vec<Chat>> {
        self.client.list_chats().await
    }

    pub async fn groups(&self) -> Result<Vec<Chat>> {
        let chats = self.client.list_chats().await?;
        Ok(chats.into_iter().filter(|c| c.is_group).collect())
    }

    /// Latest `limit` messages of a chat, `None` when the chat is unknown.
    pub async fn messages(&self, chat_id: &str, limit: usize) -> Result<Option<Vec<ChatMessage>>> {
        let Some(chat) = self.client.get_chat(chat_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.client.fetch_messages(&chat, limit).await?))
    }

    /// Tear down for good: log out when connected, then release the client.
    ///
    /// Safe on clients that never connected, and idempotent.
    pub async fn destroy(&self) {
        if self.released.load(Ordering::SeqCst) {
            return;
        }
        match self.client.connection_state().await {
            Ok(Some(EngineState::Connected)) => {
                if let Err(e) = self.client.logout().await {
                    warn!(session = %self.core.name, error = %e, "logout failed");
                }
            },
            Ok(_) => {},
            Err(e) => {
                warn!(session = %self.core.name, error = %e, "could not read connection state");
            },
        }
        self.release().await;
    }

    /// Detach from engine events and release the client, keeping credentials
    /// on the engine side so the same name resumes later.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pump) = self.pump.lock().await.take() {
            pump.abort();
        }
        if let Err(e) = self.client.destroy().await {
            warn!(session = %self.core.name, error = %e, "failed to destroy engine client");
        }
        debug!(session = %self.core.name, "engine client released");
    }
}

impl Drop for MessagingSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}
