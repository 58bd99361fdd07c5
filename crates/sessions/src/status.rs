use std::fmt;

use {
    serde::{Deserialize, Serialize},
    wagate_engine::EngineEvent,
};

/// Lifecycle stage of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Client created, engine still launching.
    #[default]
    Starting,
    /// Waiting for the device to scan the pending QR code.
    ScanQrCode,
    /// Paired and able to send.
    Working,
    /// Another client took over this identity, or the engine never launched.
    Failed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::ScanQrCode => "SCAN_QR_CODE",
            Self::Working => "WORKING",
            Self::Failed => "FAILED",
        }
    }

    /// Transition table: the status after `trigger` arrives in status `self`.
    ///
    /// | trigger                       | next            |
    /// |-------------------------------|-----------------|
    /// | ready                         | `WORKING`       |
    /// | qr-received                   | `SCAN_QR_CODE`  |
    /// | state-changed(CONFLICT)       | `FAILED`        |
    /// | state-changed(other)          | unchanged       |
    /// | message-received              | unchanged       |
    /// | init-failed                   | `FAILED`        |
    pub fn next(self, trigger: &Trigger) -> Self {
        match trigger {
            Trigger::Engine(EngineEvent::Ready) => Self::Working,
            Trigger::Engine(EngineEvent::QrReceived { .. }) => Self::ScanQrCode,
            Trigger::Engine(EngineEvent::StateChanged { state }) if state.is_conflict() => {
                Self::Failed
            },
            Trigger::Engine(EngineEvent::StateChanged { .. }) => self,
            Trigger::Engine(EngineEvent::MessageReceived { .. }) => self,
            Trigger::InitFailed(_) => Self::Failed,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that can move a session between statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// An event pushed by the engine client.
    Engine(EngineEvent),
    /// `initialize` on the engine client returned an error.
    InitFailed(String),
}

impl Trigger {
    /// Name used on the webhook wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Engine(EngineEvent::Ready) => "ready",
            Self::Engine(EngineEvent::StateChanged { .. }) => "state-changed",
            Self::Engine(EngineEvent::MessageReceived { .. }) => "message-received",
            Self::Engine(EngineEvent::QrReceived { .. }) => "qr-received",
            Self::InitFailed(_) => "init-failed",
        }
    }
}
