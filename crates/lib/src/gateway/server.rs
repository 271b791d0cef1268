//! Gateway HTTP server: webhook handshake, webhook intake, identity probe.

use crate::channels::whatsapp::{self, VerifyParams};
use crate::channels::InboundParse;
use crate::config::{self, Config};
use crate::dispatch::Dispatcher;
use crate::relay::Relay;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Expected `hub.verify_token`; None rejects every handshake.
    pub verify_token: Option<String>,
    pub dispatcher: Dispatcher,
}

impl GatewayState {
    pub fn new(config: Config, dispatcher: Dispatcher) -> Self {
        let verify_token = config::resolve_verify_token(&config);
        Self {
            config: Arc::new(config),
            verify_token,
            dispatcher,
        }
    }
}

/// Routes: `GET /`, `GET /webhook`, `POST /webhook`. Every route allows any origin.
pub fn router(state: GatewayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(identity_http))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .layer(cors)
        .with_state(state)
}

/// Run the gateway; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C), then waits for in-flight relay tasks.
pub async fn run_gateway(config: Config) -> Result<()> {
    config.warn_missing();
    let relay = Relay::from_config(&config)?;
    let dispatcher = Dispatcher::new(Arc::new(relay));
    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let state = GatewayState::new(config, dispatcher.clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;

    let pending = dispatcher.in_flight();
    if pending > 0 {
        log::info!("waiting for {} in-flight relay task(s)", pending);
    }
    dispatcher.drain().await;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, no longer accepting webhooks");
}

/// GET /webhook: provider handshake. Echoes hub.challenge or answers 403.
async fn verify_webhook(
    State(state): State<GatewayState>,
    query: Option<Query<VerifyParams>>,
) -> (StatusCode, String) {
    let params = query.map(|Query(p)| p).unwrap_or_default();
    match whatsapp::verify_handshake(&params, state.verify_token.as_deref()) {
        Ok(challenge) => {
            log::info!("webhook verified");
            (StatusCode::OK, challenge)
        }
        Err(e) => {
            log::warn!("{} (mode {:?})", e, params.mode);
            (StatusCode::FORBIDDEN, "Verification failed".to_string())
        }
    }
}

/// POST /webhook: always 200 "OK". Text messages are relayed in the background.
async fn receive_webhook(State(state): State<GatewayState>, body: Bytes) -> (StatusCode, &'static str) {
    log::debug!("webhook received: {}", String::from_utf8_lossy(&body));
    match whatsapp::parse_webhook(&body) {
        InboundParse::Message(msg) => {
            log::info!(
                "inbound text from {} ({})",
                msg.sender_id,
                msg.message_id.as_deref().unwrap_or("no id")
            );
            let handle = state.dispatcher.dispatch(msg);
            log::debug!("dispatched {}", handle.id);
        }
        InboundParse::NotApplicable(reason) => {
            log::debug!("webhook ignored: {}", reason);
        }
    }
    (StatusCode::OK, "OK")
}

/// GET / returns the static identity JSON.
async fn identity_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({ "message": state.config.gateway.name }))
}
