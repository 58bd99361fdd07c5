//! Config schema types (server, auth, engine, webhooks, sessions).

use std::path::PathBuf;

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WagateConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub engine: EngineConfig,
    pub webhooks: WebhooksConfig,
    pub sessions: SessionsConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// API authentication. When no token is configured the API is open.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token required on every route except the liveness probes.
    /// `WAGATE_TOKEN` in the environment takes precedence.
    #[serde(skip_serializing)]
    pub token: Option<Secret<String>>,
}

/// Which messaging engine driver backs the sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Browser-automation sidecar reached over HTTP.
    #[default]
    Bridge,
    /// In-process engine that never talks to a real network.
    Memory,
}

/// Messaging engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Base URL of the bridge sidecar.
    pub url: String,
    /// Timeout for individual bridge requests (not the event stream).
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Bridge,
            url: "http://127.0.0.1:3100".into(),
            request_timeout_secs: 30,
        }
    }
}

/// Outbound webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhooksConfig {
    /// Used for sessions started without their own webhook URL.
    pub default_url: Option<String>,
    pub timeout_secs: u64,
    /// Upper bound on concurrently running deliveries; extra events are dropped.
    pub max_in_flight: usize,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            default_url: None,
            timeout_secs: 10,
            max_in_flight: 64,
        }
    }
}

/// Session bookkeeping across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Start every persisted session again at boot.
    pub restore: bool,
    /// Session names started at boot in addition to restored ones.
    pub autostart: Vec<String>,
    /// Overrides `~/.wagate/sessions.json`.
    pub metadata_path: Option<PathBuf>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            restore: true,
            autostart: Vec::new(),
            metadata_path: None,
        }
    }
}

impl SessionsConfig {
    /// Resolved path of the session metadata file.
    pub fn metadata_path(&self) -> PathBuf {
        self.metadata_path
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("sessions.json"))
    }
}
