//! HTTP handlers for session lifecycle and messaging.

use std::{collections::HashMap, sync::Arc};

use {
    axum::{
        Extension, Json, Router,
        body::Bytes,
        extract::{
            Path, Query, Request, State,
            rejection::{JsonRejection, QueryRejection},
        },
        http::header::CONTENT_TYPE,
        middleware::{self, Next},
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::debug,
    wagate_sessions::{MessagingSession, PollSpec, SessionStatus},
};

use crate::{
    error::{GatewayError, GatewayResult},
    qr,
    state::GatewayState,
};

/// Messages returned by `GET /{session}/messages/{chatId}` without `?limit`.
pub const DEFAULT_MESSAGE_LIMIT: usize = 10;

type AppState = Arc<GatewayState>;

// ── Routers ──────────────────────────────────────────────────────────────────

/// Every session route. Callers add auth on top.
pub fn session_routes(state: AppState) -> Router<AppState> {
    let working = Router::new()
        .route("/sessions/{session}/me", get(me_handler))
        .route("/{session}/messages/send-text", post(send_text_handler))
        .route("/{session}/messages/send-poll", post(send_poll_handler))
        .route("/{session}/messages", get(chats_handler))
        .route("/{session}/messages/{chat_id}", get(messages_handler))
        .route("/{session}/groups", get(groups_handler))
        .route_layer(middleware::from_fn_with_state(state, require_working));

    Router::new()
        .route("/sessions", get(list_handler))
        .route("/sessions/{session}/start", post(start_handler))
        .route("/sessions/{session}/stop", post(stop_handler))
        .route("/{session}/auth/qr", get(qr_handler))
        .merge(working)
}

// ── Precondition ─────────────────────────────────────────────────────────────

/// Resolve `{session}` and let the request through only when it is `WORKING`.
///
/// The resolved session travels to the handler as a request extension.
async fn require_working(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Response {
    let name = params.get("session").map(String::as_str).unwrap_or_default();
    let session = match lookup(&state, name).await {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };

    let status = session.state().await;
    if status != SessionStatus::Working {
        debug!(session = %session.name(), %status, "rejecting request, session not ready");
        return GatewayError::NotReady {
            name: session.name().to_string(),
            status,
        }
        .into_response();
    }

    request.extensions_mut().insert(session);
    next.run(request).await
}

async fn lookup(state: &GatewayState, name: &str) -> GatewayResult<Arc<MessagingSession>> {
    state
        .registry
        .get(name)
        .await
        .ok_or_else(|| GatewayError::SessionNotFound(name.to_lowercase()))
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    #[serde(default)]
    webhook_url: Option<String>,
}

async fn list_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "result": state.registry.list().await }))
}

async fn start_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> GatewayResult<Json<Value>> {
    let request: StartRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| GatewayError::BadRequest(format!("invalid start request: {e}")))?
    };
    let webhook_url = request.webhook_url.filter(|u| !u.trim().is_empty());
    state.registry.start(&name, webhook_url).await;
    Ok(Json(json!({})))
}

async fn stop_handler(State(state): State<AppState>, Path(name): Path<String>) -> Json<Value> {
    state.registry.stop(&name).await;
    Json(json!({}))
}

async fn qr_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> GatewayResult<Response> {
    let session = lookup(&state, &name).await?;
    match session.qr().await {
        (SessionStatus::ScanQrCode, Some(value)) => {
            let png =
                qr::render_png(&value).map_err(|e| GatewayError::Internal(format!("{e:#}")))?;
            Ok(([(CONTENT_TYPE, "image/png")], png).into_response())
        },
        (status, _) => Ok(Json(json!({ "result": { "state": status } })).into_response()),
    }
}

// ── Working-only ─────────────────────────────────────────────────────────────

async fn me_handler(
    Extension(session): Extension<Arc<MessagingSession>>,
) -> GatewayResult<Json<Value>> {
    let info = session.info().await?;
    Ok(Json(json!({
        "result": { "state": session.state().await, "info": info }
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendTextRequest {
    #[serde(default)]
    chat_id: Option<String>,
    #[serde(default)]
    number: Option<String>,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendPollRequest {
    #[serde(default)]
    chat_id: Option<String>,
    #[serde(default)]
    number: Option<String>,
    poll: PollSpec,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> GatewayResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| GatewayError::BadRequest(e.body_text()))
}

/// Pick the chat to send to: an explicit `chatId` wins, otherwise the phone
/// `number` is resolved through the engine.
async fn resolve_target(
    session: &MessagingSession,
    chat_id: Option<String>,
    number: Option<String>,
) -> GatewayResult<String> {
    if let Some(chat_id) = chat_id.filter(|c| !c.trim().is_empty()) {
        return Ok(chat_id);
    }
    let Some(number) = number.filter(|n| !n.trim().is_empty()) else {
        return Err(GatewayError::BadRequest(
            "either chatId or number is required".into(),
        ));
    };
    session
        .resolve_number(number.trim())
        .await?
        .ok_or_else(|| GatewayError::BadRequest(format!("number {number} is not registered")))
}

async fn send_text_handler(
    Extension(session): Extension<Arc<MessagingSession>>,
    payload: Result<Json<SendTextRequest>, JsonRejection>,
) -> GatewayResult<Json<Value>> {
    let request = json_body(payload)?;
    let chat_id = resolve_target(&session, request.chat_id, request.number).await?;
    session.send_text(&chat_id, &request.text).await?;
    Ok(Json(json!({})))
}

async fn send_poll_handler(
    Extension(session): Extension<Arc<MessagingSession>>,
    payload: Result<Json<SendPollRequest>, JsonRejection>,
) -> GatewayResult<Json<Value>> {
    let request = json_body(payload)?;
    let chat_id = resolve_target(&session, request.chat_id, request.number).await?;
    session.send_poll(&chat_id, request.poll).await?;
    Ok(Json(json!({})))
}

async fn chats_handler(
    Extension(session): Extension<Arc<MessagingSession>>,
) -> GatewayResult<Json<Value>> {
    Ok(Json(json!({ "result": session.chats().await? })))
}

async fn groups_handler(
    Extension(session): Extension<Arc<MessagingSession>>,
) -> GatewayResult<Json<Value>> {
    Ok(Json(json!({ "result": session.groups().await? })))
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    limit: Option<usize>,
}

async fn messages_handler(
    Extension(session): Extension<Arc<MessagingSession>>,
    Path((_, chat_id)): Path<(String, String)>,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> GatewayResult<Json<Value>> {
    let Query(query) = query.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT);
    let messages = session
        .messages(&chat_id, limit)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("chat {chat_id} not found")))?;
    Ok(Json(json!({ "result": messages })))
}
