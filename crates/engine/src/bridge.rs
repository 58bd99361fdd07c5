//! HTTP driver for a browser-automation sidecar.
//!
//! The sidecar hosts the real messaging clients (one per session id) and
//! exposes them over REST under `/clients/{id}`. Lifecycle events are read
//! from `GET /clients/{id}/events`, a newline-delimited JSON stream.

use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    futures::StreamExt,
    reqwest::{Response, StatusCode},
    serde::{Deserialize, de::DeserializeOwned},
    serde_json::json,
    tokio::{sync::Mutex, task::JoinHandle},
    tracing::{debug, trace, warn},
    urlencoding::encode,
};

use crate::{
    client::{EngineClient, EventSender, MessagingEngine},
    types::{Chat, ChatMessage, ClientInfo, EngineEvent, EngineState, MessageContent},
};

/// Longest slice of an error body echoed back in error messages.
const MAX_ERROR_BODY: usize = 300;

/// Longest event line accepted from the bridge stream.
const MAX_EVENT_LINE: usize = 1024 * 1024;

/// Engine backed by a bridge sidecar.
pub struct BridgeEngine {
    base_url: String,
    /// Request/response calls, bounded by the configured timeout.
    http: reqwest::Client,
    /// Event streams stay open for the client's lifetime, so no total timeout.
    stream_http: reqwest::Client,
}

impl BridgeEngine {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build bridge HTTP client")?;
        let stream_http = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .context("failed to build bridge stream client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            stream_http,
        })
    }
}

impl MessagingEngine for BridgeEngine {
    fn id(&self) -> &str {
        "bridge"
    }

    fn create_client(&self, session_id: &str, events: EventSender) -> Arc<dyn EngineClient> {
        Arc::new(BridgeClient {
            session_id: session_id.to_string(),
            client_url: format!("{}/clients/{}", self.base_url, encode(session_id)),
            http: self.http.clone(),
            stream_http: self.stream_http.clone(),
            events,
            stream_task: Mutex::new(None),
        })
    }
}

/// One sidecar-hosted client.
pub struct BridgeClient {
    session_id: String,
    client_url: String,
    http: reqwest::Client,
    stream_http: reqwest::Client,
    events: EventSender,
    stream_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Deserialize)]
struct StateReply {
    state: Option<EngineState>,
}

#[derive(Deserialize)]
struct NumberReply {
    id: Option<String>,
}

impl BridgeClient {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.client_url)
    }

    fn chat_url(&self, chat_id: &str, rest: &str) -> String {
        self.url(&format!("/chats/{}{rest}", encode(chat_id)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("bridge GET {url}"))?;
        Ok(check(resp).await?.json().await?)
    }

    /// GET where a 404 means "no such thing" rather than a failure.
    async fn get_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("bridge GET {url}"))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(resp).await?.json().await?))
    }

    /// Subscribe to the event stream. Returns once the bridge has accepted the
    /// subscription; the body is read by a background task.
    async fn open_event_stream(&self) -> Result<()> {
        let mut task = self.stream_task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }
        let url = self.url("/events");
        let resp = self
            .stream_http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("bridge GET {url}"))?;
        let resp = check(resp)
            .await
            .context("bridge refused event stream")?;
        *task = Some(tokio::spawn(pump_events(
            resp,
            self.session_id.clone(),
            self.events.clone(),
        )));
        Ok(())
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        if let Some(task) = self.stream_task.get_mut().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl EngineClient for BridgeClient {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn initialize(&self) -> Result<()> {
        // Subscribe first so a QR emitted during launch is not missed.
        self.open_event_stream().await?;
        let url = self.client_url.clone();
        let resp = self
            .http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("bridge POST {url}"))?;
        check(resp).await?;
        debug!(session = %self.session_id, "bridge client initialized");
        Ok(())
    }

    async fn connection_state(&self) -> Result<Option<EngineState>> {
        let reply: Option<StateReply> = self.get_optional(&self.url("/state")).await?;
        Ok(reply.and_then(|r| r.state))
    }

    async fn logout(&self) -> Result<()> {
        let url = self.url("/logout");
        let resp = self
            .http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("bridge POST {url}"))?;
        check(resp).await?;
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        if let Some(task) = self.stream_task.lock().await.take() {
            task.abort();
        }
        let url = self.client_url.clone();
        let resp = self
            .http
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("bridge DELETE {url}"))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(resp).await?;
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, content: MessageContent) -> Result<()> {
        let url = self.url("/messages");
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "chatId": chat_id, "content": content }))
            .send()
            .await
            .with_context(|| format!("bridge POST {url}"))?;
        check(resp).await?;
        Ok(())
    }

    async fn resolve_number(&self, number: &str) -> Result<Option<String>> {
        let url = self.url(&format!("/numbers/{}", encode(number)));
        let reply: Option<NumberReply> = self.get_optional(&url).await?;
        Ok(reply.and_then(|r| r.id))
    }

    async fn list_chats(&self) -> Result<Vec<Chat>> {
        self.get_json(&self.url("/chats")).await
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        self.get_optional(&self.chat_url(chat_id, "")).await
    }

    async fn fetch_messages(&self, chat: &Chat, limit: usize) -> Result<Vec<ChatMessage>> {
        let url = self.chat_url(&chat.id, &format!("/messages?limit={limit}"));
        self.get_json(&url).await
    }

    async fn info(&self) -> Result<Option<ClientInfo>> {
        self.get_optional(&self.url("/me")).await
    }
}

/// Turn a non-2xx reply into an error carrying (a prefix of) the body.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    bail!("bridge returned {status}: {body}")
}

/// Splits a byte stream into newline-terminated lines, dropping any line
/// longer than [`MAX_EVENT_LINE`].
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
    /// The current line already overflowed; skip up to the next newline.
    skipping: bool,
}

impl LineBuffer {
    /// Feed a chunk. Returns the completed lines and how many were dropped.
    fn push(&mut self, chunk: &[u8]) -> (Vec<Vec<u8>>, usize) {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut dropped = 0;
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if self.skipping {
                self.skipping = false;
            } else if line.len() > MAX_EVENT_LINE {
                dropped += 1;
            } else {
                lines.push(line);
            }
        }
        if self.pending.len() > MAX_EVENT_LINE {
            self.pending.clear();
            if !self.skipping {
                self.skipping = true;
                dropped += 1;
            }
        }
        (lines, dropped)
    }

    /// Whatever is left once the stream ends.
    fn finish(self) -> Option<Vec<u8>> {
        (!self.skipping && !self.pending.is_empty()).then_some(self.pending)
    }
}

/// Read the NDJSON event stream until it closes or the session goes away.
async fn pump_events(resp: Response, session_id: String, events: EventSender) {
    let mut stream = resp.bytes_stream();
    let mut buffer = LineBuffer::default();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(session = %session_id, error = %e, "error reading bridge event stream");
                return;
            },
        };
        let (lines, dropped) = buffer.push(&chunk);
        if dropped > 0 {
            warn!(
                session = %session_id,
                dropped,
                limit = MAX_EVENT_LINE,
                "dropping oversized bridge event line"
            );
        }
        for line in lines {
            if !dispatch_line(&line, &session_id, &events) {
                return;
            }
        }
    }
    if let Some(rest) = buffer.finish() {
        dispatch_line(&rest, &session_id, &events);
    }
    debug!(session = %session_id, "bridge event stream closed");
}

/// Returns false once the receiving session is gone.
fn dispatch_line(line: &[u8], session_id: &str, events: &EventSender) -> bool {
    let line = line.trim_ascii();
    if line.is_empty() {
        return true;
    }
    trace!(session = %session_id, raw = %String::from_utf8_lossy(line), "bridge -> gateway");
    match serde_json::from_slice::<EngineEvent>(line) {
        Ok(event) => events.send(event).is_ok(),
        Err(e) => {
            warn!(session = %session_id, error = %e, "ignoring malformed bridge event");
            true
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use {super::*, mockito::Matcher, tokio::sync::mpsc};

    fn engine(server: &mockito::ServerGuard) -> BridgeEngine {
        BridgeEngine::new(&server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn initialize_streams_events() {
        let mut server = mockito::Server::new_async().await;
        let events_mock = server
            .mock("GET", "/clients/alice/events")
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_body("{\"type\":\"qr\",\"value\":\"2@xyz\"}\nnot json\n\n{\"type\":\"ready\"}\n")
            .create_async()
            .await;
        let init_mock = server
            .mock("POST", "/clients/alice")
            .with_status(201)
            .create_async()
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = engine(&server).create_client("alice", tx);
        client.initialize().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), EngineEvent::QrReceived {
            value: "2@xyz".into()
        });
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::Ready);
        init_mock.assert_async().await;
        events_mock.assert_async().await;
    }

    #[tokio::test]
    async fn subscribes_before_creating_client() {
        let mut server = mockito::Server::new_async().await;
        let subscribed = Arc::new(AtomicBool::new(false));
        let subscribed_at_init = Arc::new(AtomicBool::new(false));

        server
            .mock("GET", "/clients/alice/events")
            .with_status(200)
            .with_body_from_request({
                let subscribed = Arc::clone(&subscribed);
                move |_| {
                    subscribed.store(true, Ordering::SeqCst);
                    b"{\"type\":\"ready\"}\n".to_vec()
                }
            })
            .create_async()
            .await;
        server
            .mock("POST", "/clients/alice")
            .with_status(201)
            .with_body_from_request({
                let subscribed = Arc::clone(&subscribed);
                let subscribed_at_init = Arc::clone(&subscribed_at_init);
                move |_| {
                    subscribed_at_init.store(subscribed.load(Ordering::SeqCst), Ordering::SeqCst);
                    Vec::new()
                }
            })
            .create_async()
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = engine(&server).create_client("alice", tx);
        client.initialize().await.unwrap();

        assert!(subscribed_at_init.load(Ordering::SeqCst));
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::Ready);
    }

    #[tokio::test]
    async fn refused_stream_fails_initialize() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/clients/carol/events")
            .with_status(503)
            .create_async()
            .await;
        let init_mock = server
            .mock("POST", "/clients/carol")
            .with_status(201)
            .expect(0)
            .create_async()
            .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let client = engine(&server).create_client("carol", tx);
        let err = client.initialize().await.unwrap_err();
        assert!(format!("{err:#}").contains("503"), "{err:#}");
        init_mock.assert_async().await;
    }

    #[test]
    fn line_buffer_splits_chunks() {
        let mut buffer = LineBuffer::default();
        let (lines, dropped) = buffer.push(b"{\"type\":");
        assert!(lines.is_empty());
        assert_eq!(dropped, 0);

        let (lines, dropped) = buffer.push(b"\"ready\"}\n{\"type\"");
        assert_eq!(lines, vec![b"{\"type\":\"ready\"}\n".to_vec()]);
        assert_eq!(dropped, 0);
        assert_eq!(buffer.finish(), Some(b"{\"type\"".to_vec()));
    }

    #[test]
    fn line_buffer_drops_oversized_lines() {
        let mut buffer = LineBuffer::default();
        let big = vec![b'x'; MAX_EVENT_LINE / 2 + 1];

        // Overflows across chunks without a newline; memory stays bounded.
        assert_eq!(buffer.push(&big), (Vec::new(), 0));
        let (lines, dropped) = buffer.push(&big);
        assert!(lines.is_empty());
        assert_eq!(dropped, 1);
        assert!(buffer.pending.len() <= MAX_EVENT_LINE);

        // The tail of the oversized line is skipped, the next line survives.
        let (lines, dropped) = buffer.push(b"tail\n{\"type\":\"ready\"}\n");
        assert_eq!(lines, vec![b"{\"type\":\"ready\"}\n".to_vec()]);
        assert_eq!(dropped, 0);

        // A complete oversized line inside one chunk is dropped too.
        let mut whole = vec![b'y'; MAX_EVENT_LINE + 1];
        whole.push(b'\n');
        let (lines, dropped) = buffer.push(&whole);
        assert!(lines.is_empty());
        assert_eq!(dropped, 1);
        assert_eq!(buffer.finish(), None);
    }

    #[tokio::test]
    async fn initialize_failure_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/clients/bob/events")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/clients/bob")
            .with_status(500)
            .with_body("browser crashed")
            .create_async()
            .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let client = engine(&server).create_client("bob", tx);
        let err = client.initialize().await.unwrap_err();
        assert!(err.to_string().contains("browser crashed"));
    }

    #[tokio::test]
    async fn send_message_posts_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/clients/alice/messages")
            .match_body(Matcher::PartialJson(json!({
                "chatId": "123@c.us",
                "content": { "type": "text", "body": "hi" }
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let client = engine(&server).create_client("alice", tx);
        client
            .send_message("123@c.us", MessageContent::Text { body: "hi".into() })
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn lookups_map_404_to_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/clients/alice/numbers/15550001")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/clients/alice/chats/nobody%40c.us")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/clients/alice/state")
            .with_status(200)
            .with_body(r#"{"state":null}"#)
            .create_async()
            .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let client = engine(&server).create_client("alice", tx);
        assert_eq!(client.resolve_number("15550001").await.unwrap(), None);
        assert_eq!(client.get_chat("nobody@c.us").await.unwrap(), None);
        assert_eq!(client.connection_state().await.unwrap(), None);
    }

    #[tokio::test]
    async fn fetch_messages_passes_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/clients/alice/chats/123%40c.us/messages")
            .match_query(Matcher::UrlEncoded("limit".into(), "5".into()))
            .with_status(200)
            .with_body(r#"[{"id":"m1","body":"hello","fromMe":true}]"#)
            .create_async()
            .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let client = engine(&server).create_client("alice", tx);
        let chat = Chat {
            id: "123@c.us".into(),
            ..Chat::default()
        };
        let messages = client.fetch_messages(&chat, 5).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].from_me);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn destroy_tolerates_unknown_client() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/clients/ghost")
            .with_status(404)
            .create_async()
            .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let client = engine(&server).create_client("ghost", tx);
        client.destroy().await.unwrap();
    }
}
