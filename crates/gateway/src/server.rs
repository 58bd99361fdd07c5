use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    anyhow::Context,
    axum::{
        Router,
        extract::State,
        middleware,
        response::{IntoResponse, Json},
        routing::get,
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
    wagate_config::{EngineConfig, EngineKind, WagateConfig},
    wagate_engine::{MessagingEngine, bridge::BridgeEngine, memory::MemoryEngine},
    wagate_sessions::{SessionMetadata, SessionRegistry, WebhookSink},
};

use crate::{auth, routes, state::GatewayState};

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = routes::session_routes(Arc::clone(&state)).route_layer(
        middleware::from_fn_with_state(Arc::clone(&state), auth::require_token),
    );

    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Engine driver selected by `engine.kind`.
pub fn build_engine(config: &EngineConfig) -> anyhow::Result<Arc<dyn MessagingEngine>> {
    let engine: Arc<dyn MessagingEngine> = match config.kind {
        EngineKind::Bridge => Arc::new(BridgeEngine::new(
            &config.url,
            Duration::from_secs(config.request_timeout_secs),
        )?),
        EngineKind::Memory => Arc::new(MemoryEngine::new().auto_pair()),
    };
    Ok(engine)
}

/// Session registry wired with the webhook sink and the metadata store.
pub fn build_registry(
    config: &WagateConfig,
    engine: Arc<dyn MessagingEngine>,
) -> anyhow::Result<SessionRegistry> {
    let webhooks = WebhookSink::new(
        Duration::from_secs(config.webhooks.timeout_secs),
        config.webhooks.max_in_flight,
    )?;
    let metadata_path = config.sessions.metadata_path();
    let metadata = SessionMetadata::load(metadata_path.clone()).with_context(|| {
        format!(
            "failed to load session metadata from {}",
            metadata_path.display()
        )
    })?;
    Ok(SessionRegistry::new(engine, webhooks)
        .with_default_webhook(config.webhooks.default_url.clone())
        .with_metadata(metadata))
}

/// Start the gateway HTTP server and run it until a shutdown signal.
pub async fn start_gateway(config: WagateConfig) -> anyhow::Result<()> {
    // Resolve auth: WAGATE_TOKEN wins over the config file.
    let env_token = std::env::var("WAGATE_TOKEN").ok();
    let resolved_auth = auth::resolve_auth(env_token, config.auth.token.clone());

    let engine = build_engine(&config.engine)?;
    let registry = build_registry(&config, engine)?;
    let state = GatewayState::new(registry, resolved_auth);

    let restored = if config.sessions.restore {
        state.registry.restore().await
    } else {
        0
    };
    for name in &config.sessions.autostart {
        state.registry.start(name, None).await;
    }

    let app = build_gateway_app(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // Startup banner.
    let lines = [
        format!("wagate gateway v{}", state.version),
        format!("listening on http://{addr}"),
        format!("engine: {} ({})", state.registry.engine_id(), config.engine.url),
        format!(
            "sessions: {} restored, {} autostart",
            restored,
            config.sessions.autostart.len()
        ),
        format!(
            "auth: {}",
            if state.auth.is_enabled() {
                "bearer token"
            } else {
                "disabled"
            }
        ),
    ];
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Release engine clients; metadata stays so the next boot resumes them.
    let live = state.registry.len().await;
    state.registry.shutdown().await;
    info!(sessions = live, "gateway stopped");
    Ok(())
}

// ── Graceful shutdown ────────────────────────────────────────────────────────

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received, stopping gateway");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "sessions": state.registry.len().await,
        "uptime_secs": state.uptime_secs(),
    }))
}
