//! Session bookkeeping.
//!
//! A session binds one engine client to a small status model and an optional
//! webhook sink. The registry keeps at most one live session per name and
//! serializes start/stop per name. Known sessions are persisted as a JSON
//! index so they can be resumed after a restart.

pub mod metadata;
pub mod name;
pub mod registry;
pub mod session;
pub mod status;
pub mod webhook;

pub use {
    metadata::{SessionMetadata, SessionRecord},
    name::SessionName,
    registry::{SessionRegistry, SessionSummary},
    session::{MessagingSession, PollSpec, is_valid_chat_id},
    status::{SessionStatus, Trigger},
    webhook::{WebhookEvent, WebhookSink},
};
