//! Best-effort webhook delivery of session lifecycle events.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Context,
    serde::Serialize,
    serde_json::Value,
    tokio::{sync::Semaphore, task::JoinHandle},
    tracing::{debug, warn},
    wagate_engine::EngineEvent,
};

use crate::{
    name::SessionName,
    status::{SessionStatus, Trigger},
};

/// One webhook delivery body: `{event, session, state?, result?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEvent {
    pub event: &'static str,
    pub session: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SessionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl WebhookEvent {
    /// Payload for `trigger`, given the status it produced.
    pub fn for_trigger(session: &SessionName, trigger: &Trigger, status: SessionStatus) -> Self {
        let (state, result) = match trigger {
            Trigger::Engine(EngineEvent::Ready) => (Some(status), None),
            Trigger::Engine(EngineEvent::StateChanged { state }) => {
                (None, Some(Value::String(state.to_string())))
            },
            Trigger::Engine(EngineEvent::MessageReceived { .. }) => (None, None),
            Trigger::Engine(EngineEvent::QrReceived { value }) => {
                (Some(status), Some(Value::String(value.clone())))
            },
            Trigger::InitFailed(reason) => (Some(status), Some(Value::String(reason.clone()))),
        };
        Self {
            event: trigger.event_name(),
            session: session.to_string(),
            state,
            result,
        }
    }
}

/// Fire-and-forget POST of webhook events, bounded by a permit pool.
#[derive(Clone)]
pub struct WebhookSink {
    http: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl WebhookSink {
    pub fn new(timeout: Duration, max_in_flight: usize) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            http,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        })
    }

    /// Spawn a delivery of `event` to `url`.
    ///
    /// Returns `None` when the in-flight bound is reached and the event was
    /// dropped. The caller never has to await the handle.
    pub fn dispatch(&self, url: &str, event: WebhookEvent) -> Option<JoinHandle<bool>> {
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            warn!(
                url,
                event = event.event,
                session = %event.session,
                "webhook deliveries saturated, dropping event"
            );
            return None;
        };
        let http = self.http.clone();
        let url = url.to_string();
        Some(tokio::spawn(async move {
            let _permit = permit;
            deliver(&http, &url, &event).await
        }))
    }
}

/// POST one event. Failures are logged and reported as `false`, never raised.
async fn deliver(http: &reqwest::Client, url: &str, event: &WebhookEvent) -> bool {
    match http.post(url).json(event).send().await {
        Ok(resp) if resp.status().is_success() => {
            debug!(url, event = event.event, session = %event.session, "webhook delivered");
            true
        },
        Ok(resp) => {
            warn!(
                url,
                event = event.event,
                session = %event.session,
                status = %resp.status(),
                "webhook rejected event"
            );
            false
        },
        Err(e) => {
            warn!(
                url,
                event = event.event,
                session = %event.session,
                error = %e,
                "webhook delivery failed"
            );
            false
        },
    }
}
