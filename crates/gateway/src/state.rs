use std::{sync::Arc, time::Instant};

use wagate_sessions::SessionRegistry;

use crate::auth::ResolvedAuth;

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across async tasks.
pub struct GatewayState {
    /// Live sessions.
    pub registry: SessionRegistry,
    /// Auth configuration.
    pub auth: ResolvedAuth,
    /// Server version string.
    pub version: String,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(registry: SessionRegistry, auth: ResolvedAuth) -> Arc<Self> {
        Arc::new(Self {
            registry,
            auth,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
