//! Messaging engine seam.
//!
//! The engine owns the actual protocol work (device pairing, transport, chat
//! state). The gateway only sees the [`MessagingEngine`] / [`EngineClient`]
//! traits and the lifecycle events a client pushes back.
//!
//! Drivers:
//! - [`bridge::BridgeEngine`]: browser-automation sidecar over HTTP + NDJSON events
//! - [`memory::MemoryEngine`]: in-process engine for local runs and tests

pub mod bridge;
pub mod client;
pub mod memory;
pub mod types;

pub use {
    client::{EngineClient, EventSender, MessagingEngine},
    types::{
        Chat, ChatMessage, ClientInfo, EngineEvent, EngineState, IncomingMessage, MessageContent,
        Poll,
    },
};
