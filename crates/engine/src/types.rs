use std::fmt;

use serde::{Deserialize, Serialize};

// ── Engine state ────────────────────────────────────────────────────────────

/// Connection state as reported by the external engine.
///
/// Values the gateway does not know about are kept verbatim in `Other` so
/// they can still be forwarded to webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EngineState {
    Conflict,
    Connected,
    DeprecatedVersion,
    Opening,
    Pairing,
    ProxyBlock,
    SmbTosBlock,
    Timeout,
    TosBlock,
    Unlaunched,
    Unpaired,
    UnpairedIdle,
    Other(String),
}

impl EngineState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Conflict => "CONFLICT",
            Self::Connected => "CONNECTED",
            Self::DeprecatedVersion => "DEPRECATED_VERSION",
            Self::Opening => "OPENING",
            Self::Pairing => "PAIRING",
            Self::ProxyBlock => "PROXYBLOCK",
            Self::SmbTosBlock => "SMB_TOS_BLOCK",
            Self::Timeout => "TIMEOUT",
            Self::TosBlock => "TOS_BLOCK",
            Self::Unlaunched => "UNLAUNCHED",
            Self::Unpaired => "UNPAIRED",
            Self::UnpairedIdle => "UNPAIRED_IDLE",
            Self::Other(s) => s,
        }
    }

    /// Another client took over this identity.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

impl From<String> for EngineState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "CONFLICT" => Self::Conflict,
            "CONNECTED" => Self::Connected,
            "DEPRECATED_VERSION" => Self::DeprecatedVersion,
            "OPENING" => Self::Opening,
            "PAIRING" => Self::Pairing,
            "PROXYBLOCK" => Self::ProxyBlock,
            "SMB_TOS_BLOCK" => Self::SmbTosBlock,
            "TIMEOUT" => Self::Timeout,
            "TOS_BLOCK" => Self::TosBlock,
            "UNLAUNCHED" => Self::Unlaunched,
            "UNPAIRED" => Self::Unpaired,
            "UNPAIRED_IDLE" => Self::UnpairedIdle,
            _ => Self::Other(s),
        }
    }
}

impl From<EngineState> for String {
    fn from(state: EngineState) -> Self {
        match state {
            EngineState::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Events ──────────────────────────────────────────────────────────────────

/// Minimal view of an inbound message. The gateway does not interpret it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IncomingMessage {
    pub id: String,
    pub from: String,
    pub body: String,
    pub timestamp: i64,
}

/// Lifecycle events a client pushes to its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Ready,
    StateChanged {
        state: EngineState,
    },
    #[serde(rename = "qr")]
    QrReceived {
        value: String,
    },
    #[serde(rename = "message")]
    MessageReceived {
        #[serde(default)]
        message: IncomingMessage,
    },
}

// ── Outbound content ────────────────────────────────────────────────────────

/// A poll as understood by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub name: String,
    pub options: Vec<String>,
    pub allow_multiple_answers: bool,
}

impl Poll {
    /// Single-answer poll.
    pub fn new(name: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            name: name.into(),
            options,
            allow_multiple_answers: false,
        }
    }
}

/// What `send_message` delivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { body: String },
    Poll(Poll),
}

// ── Chats ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub is_group: bool,
    pub unread_count: u32,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub timestamp: i64,
    pub from_me: bool,
    pub has_media: bool,
}

/// The identity a paired client is logged in as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientInfo {
    pub wid: String,
    pub pushname: String,
    pub platform: String,
}
