//! Gateway: the HTTP surface over the session registry.
//!
//! Lifecycle:
//! 1. Load config, resolve auth
//! 2. Build the engine driver and the session registry
//! 3. Restore persisted sessions, start the autostart list
//! 4. Serve HTTP until ctrl-c / SIGTERM
//! 5. Release every engine client
//!
//! Session semantics live in `wagate-sessions`; this crate only maps HTTP
//! requests onto them.

pub mod auth;
pub mod error;
pub mod qr;
pub mod routes;
pub mod server;
pub mod state;

pub use {
    error::GatewayError,
    server::{build_gateway_app, start_gateway},
    state::GatewayState,
};
