use std::{collections::HashMap, sync::Arc};

use {
    dashmap::DashMap,
    serde::Serialize,
    tokio::sync::{Mutex, RwLock},
    tracing::{info, warn},
    wagate_engine::MessagingEngine,
};

use crate::{
    metadata::SessionMetadata,
    name::SessionName,
    session::MessagingSession,
    status::SessionStatus,
    webhook::WebhookSink,
};

/// Listing entry for one live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub name: String,
    pub state: SessionStatus,
    pub webhook: bool,
}

/// Live sessions keyed by name. At most one session exists per name.
pub struct SessionRegistry {
    engine: Arc<dyn MessagingEngine>,
    webhooks: WebhookSink,
    default_webhook: Option<String>,
    sessions: RwLock<HashMap<SessionName, Arc<MessagingSession>>>,
    /// Serializes start/stop per name. Entries are never removed, so every
    /// caller for a name contends on the same lock.
    lifecycle: DashMap<SessionName, Arc<Mutex<()>>>,
    metadata: Option<Mutex<SessionMetadata>>,
}

impl SessionRegistry {
    pub fn new(engine: Arc<dyn MessagingEngine>, webhooks: WebhookSink) -> Self {
        Self {
            engine,
            webhooks,
            default_webhook: None,
            sessions: RwLock::new(HashMap::new()),
            lifecycle: DashMap::new(),
            metadata: None,
        }
    }

    /// Webhook used by sessions started without their own.
    pub fn with_default_webhook(mut self, url: Option<String>) -> Self {
        self.default_webhook = url;
        self
    }

    /// Persist started sessions so [`restore`](Self::restore) can resume them.
    pub fn with_metadata(mut self, metadata: SessionMetadata) -> Self {
        self.metadata = Some(Mutex::new(metadata));
        self
    }

    pub fn engine_id(&self) -> &str {
        self.engine.id()
    }

    fn lifecycle_lock(&self, name: &SessionName) -> Arc<Mutex<()>> {
        Arc::clone(self.lifecycle.entry(name.clone()).or_default().value())
    }

    /// Return the session for `name`, creating it when absent.
    ///
    /// Idempotent: an existing session is returned unchanged, whatever
    /// `webhook_url` is passed.
    pub async fn start(&self, name: &str, webhook_url: Option<String>) -> Arc<MessagingSession> {
        let name = SessionName::new(name);
        let lock = self.lifecycle_lock(&name);
        let _guard = lock.lock().await;

        if let Some(existing) = self.sessions.read().await.get(&name) {
            return Arc::clone(existing);
        }

        let webhook_url = webhook_url.or_else(|| self.default_webhook.clone());
        let session = MessagingSession::start(
            name.clone(),
            webhook_url.clone(),
            self.engine.as_ref(),
            self.webhooks.clone(),
        );
        self.sessions
            .write()
            .await
            .insert(name.clone(), Arc::clone(&session));
        info!(session = %name, engine = self.engine.id(), "session started");

        if let Some(metadata) = &self.metadata {
            let mut metadata = metadata.lock().await;
            metadata.upsert(name.as_str(), webhook_url);
            if let Err(e) = metadata.save() {
                warn!(session = %name, error = %e, "failed to persist session metadata");
            }
        }
        session
    }

    /// Tear the session down, then forget it. No-op for unknown names.
    ///
    /// The name only becomes available again once teardown has finished.
    pub async fn stop(&self, name: &str) {
        let name = SessionName::new(name);
        // `start` creates the lock before the session, so no lock means no session.
        let Some(lock) = self
            .lifecycle
            .get(&name)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return;
        };
        let _guard = lock.lock().await;

        let Some(session) = self.sessions.read().await.get(&name).cloned() else {
            return;
        };
        session.destroy().await;
        self.sessions.write().await.remove(&name);
        info!(session = %name, "session stopped");

        if let Some(metadata) = &self.metadata {
            let mut metadata = metadata.lock().await;
            if metadata.remove(name.as_str()).is_some()
                && let Err(e) = metadata.save()
            {
                warn!(session = %name, error = %e, "failed to persist session metadata");
            }
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<MessagingSession>> {
        self.sessions
            .read()
            .await
            .get(&SessionName::new(name))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Live sessions sorted by name.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            out.push(SessionSummary {
                name: session.name().to_string(),
                state: session.state().await,
                webhook: session.webhook_url().is_some(),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Start every session recorded in the metadata store. Returns how many.
    pub async fn restore(&self) -> usize {
        let records = match &self.metadata {
            Some(metadata) => metadata.lock().await.list(),
            None => return 0,
        };
        let count = records.len();
        for record in records {
            self.start(&record.name, record.webhook_url).await;
        }
        count
    }

    /// Release every session without logging out, keeping the metadata so
    /// the next boot resumes them.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        for (name, session) in sessions {
            let lock = self.lifecycle_lock(&name);
            let _guard = lock.lock().await;
            session.release().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use {super::*, wagate_engine::memory::MemoryEngine};

    fn registry(engine: Arc<MemoryEngine>) -> SessionRegistry {
        SessionRegistry::new(
            engine,
            WebhookSink::new(Duration::from_secs(2), 8).unwrap(),
        )
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let engine = Arc::new(MemoryEngine::new());
        let registry = registry(Arc::clone(&engine));

        let first = registry.start("Alice", None).await;
        let second = registry.start("alice", Some("http://ignored".into())).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.webhook_url(), None);
        assert_eq!(engine.created(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn stop_then_start_is_fresh() {
        let engine = Arc::new(MemoryEngine::new());
        let registry = registry(Arc::clone(&engine));

        let first = registry.start("alice", None).await;
        engine
            .client("alice")
            .unwrap()
            .emit(wagate_engine::EngineEvent::Ready);
        for _ in 0..200 {
            if first.state().await == SessionStatus::Working {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(first.state().await, SessionStatus::Working);

        registry.stop("ALICE").await;
        assert!(registry.get("alice").await.is_none());
        let old_client = engine.client("alice").unwrap();
        assert!(old_client.is_destroyed());

        let again = registry.start("alice", None).await;
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(again.state().await, SessionStatus::Starting);
        assert_eq!(engine.client("alice").unwrap().generation(), 2);
    }

    #[tokio::test]
    async fn stop_unknown_is_noop() {
        let registry = registry(Arc::new(MemoryEngine::new()));
        registry.stop("ghost").await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn stopping_unknown_names_leaves_no_locks() {
        let registry = registry(Arc::new(MemoryEngine::new()));
        for i in 0..1000 {
            registry.stop(&format!("ghost-{i}")).await;
        }
        assert!(registry.is_empty().await);
        assert_eq!(registry.lifecycle.len(), 0);

        registry.start("alice", None).await;
        registry.stop("alice").await;
        assert_eq!(registry.lifecycle.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_starts_create_one_client() {
        let engine = Arc::new(MemoryEngine::new());
        let registry = Arc::new(registry(Arc::clone(&engine)));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.start("shared", None).await
            }));
        }
        let mut sessions = Vec::new();
        for h in handles {
            sessions.push(h.await.unwrap());
        }
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(engine.created(), 1);
    }

    #[tokio::test]
    async fn default_webhook_applies() {
        let registry = registry(Arc::new(MemoryEngine::new()))
            .with_default_webhook(Some("http://hooks.local/all".into()));
        let a = registry.start("a", None).await;
        let b = registry.start("b", Some("http://hooks.local/b".into())).await;
        assert_eq!(a.webhook_url(), Some("http://hooks.local/all"));
        assert_eq!(b.webhook_url(), Some("http://hooks.local/b"));

        let list = registry.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "a");
        assert!(list[0].webhook);
    }

    #[tokio::test]
    async fn metadata_follows_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let registry = registry(Arc::new(MemoryEngine::new()))
            .with_metadata(SessionMetadata::load(path.clone()).unwrap());

        registry.start("alice", Some("http://h".into())).await;
        registry.start("bob", None).await;
        registry.stop("bob").await;

        let on_disk = SessionMetadata::load(path).unwrap();
        assert_eq!(on_disk.list().len(), 1);
        assert_eq!(
            on_disk.get("alice").unwrap().webhook_url.as_deref(),
            Some("http://h")
        );
    }

    #[tokio::test]
    async fn restore_resumes_persisted_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        {
            let mut meta = SessionMetadata::load(path.clone()).unwrap();
            meta.upsert("alice", Some("http://h".into()));
            meta.upsert("bob", None);
            meta.save().unwrap();
        }

        let engine = Arc::new(MemoryEngine::new());
        let registry = registry(Arc::clone(&engine))
            .with_metadata(SessionMetadata::load(path).unwrap());
        assert_eq!(registry.restore().await, 2);
        assert_eq!(
            registry.get("alice").await.unwrap().webhook_url(),
            Some("http://h")
        );
        assert!(engine.client("bob").is_some());
    }

    #[tokio::test]
    async fn shutdown_releases_without_logout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let engine = Arc::new(MemoryEngine::new().auto_pair());
        let registry = registry(Arc::clone(&engine))
            .with_metadata(SessionMetadata::load(path.clone()).unwrap());

        registry.start("alice", None).await;
        registry.shutdown().await;

        let client = engine.client("alice").unwrap();
        assert!(client.is_destroyed());
        assert!(!client.is_logged_out());
        assert!(registry.is_empty().await);
        assert!(SessionMetadata::load(path).unwrap().get("alice").is_some());
    }
}
