//! Relay HTTP server.
//!
//! Serves the WebSocket relay path plus the small JSON API browsers use
//! before connecting: `/api/config`, `/api/auth/challenge` and `/api/auth`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::access::AccessGate;
use super::pairing::run_pairing;
use crate::config::AppConfig;
use crate::error::RelayError;

/// Shared state for relay handlers.
#[derive(Clone)]
pub struct RelayState {
    upstream_url: Arc<str>,
    dial_timeout: Duration,
    client_config: Arc<Value>,
    access: Arc<AccessGate>,
    active_pairings: Arc<AtomicUsize>,
}

impl RelayState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            upstream_url: Arc::from(config.upstream_url()),
            dial_timeout: config.server.upstream_dial_timeout(),
            client_config: Arc::new(config.client_view()),
            access: Arc::new(AccessGate::new(
                config.access.password.clone(),
                config.access.nonce_ttl(),
            )),
            active_pairings: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of client/upstream pairs currently open.
    pub fn active_pairings(&self) -> usize {
        self.active_pairings.load(Ordering::SeqCst)
    }
}

/// Build the relay router for `config`.
pub fn relay_router(config: &AppConfig, state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(&config.server.relay_path, get(relay_handler))
        .route("/api/config", get(config_handler))
        .route("/api/auth/challenge", get(challenge_handler))
        .route("/api/auth", post(auth_handler))
        .layer(cors)
        .with_state(state)
}

/// Start the relay on a specific address.
///
/// Returns the server task and the bound address (useful with port 0).
pub async fn start_relay_server_on(
    addr: SocketAddr,
    config: &AppConfig,
) -> Result<(JoinHandle<()>, SocketAddr), RelayError> {
    let state = RelayState::from_config(config);
    let app = relay_router(config, state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    let actual_addr = listener.local_addr()?;

    info!(
        "Relay listening on ws://{}{} -> {}",
        actual_addr,
        config.server.relay_path,
        config.upstream_url()
    );

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Relay server error: {}", e);
        }
    });

    Ok((handle, actual_addr))
}

/// Serve the relay until Ctrl-C.
pub async fn serve_until_shutdown(config: &AppConfig) -> Result<(), RelayError> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let app = relay_router(config, RelayState::from_config(config));

    info!(
        "Relay listening on ws://{}{} -> {}",
        listener.local_addr()?,
        config.server.relay_path,
        config.upstream_url()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("Could not listen for Ctrl-C; relay will run until killed");
                std::future::pending::<()>().await;
            }
            info!("Shutting down relay");
        })
        .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RelayQuery {
    ticket: Option<String>,
}

async fn relay_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RelayQuery>,
    State(state): State<RelayState>,
) -> Response {
    if state.access.is_enabled() {
        let admitted = query
            .ticket
            .as_deref()
            .is_some_and(|ticket| state.access.redeem_ticket(ticket));
        if !admitted {
            debug!("Refused relay upgrade without a valid ticket");
            return (StatusCode::UNAUTHORIZED, "Access ticket required").into_response();
        }
    }

    ws.on_upgrade(move |socket| async move {
        let pairing_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let active = state.active_pairings.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("[{}] Client connected ({} active)", pairing_id, active);

        run_pairing(socket, &state.upstream_url, state.dial_timeout, &pairing_id).await;

        state.active_pairings.fetch_sub(1, Ordering::SeqCst);
    })
}

async fn config_handler(State(state): State<RelayState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-cache")],
        Json(state.client_config.as_ref().clone()),
    )
}

async fn challenge_handler(State(state): State<RelayState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-cache")],
        Json(json!({ "nonce": state.access.issue_challenge() })),
    )
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub hash: String,
    pub nonce: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

async fn auth_handler(
    State(state): State<RelayState>,
    Json(request): Json<AuthRequest>,
) -> impl IntoResponse {
    match state.access.verify(&request.hash, &request.nonce) {
        Ok(ticket) => (
            StatusCode::OK,
            Json(AuthResponse {
                success: true,
                ticket,
                message: None,
            }),
        ),
        Err(denied) => (
            StatusCode::UNAUTHORIZED,
            Json(AuthResponse {
                success: false,
                ticket: None,
                message: Some(denied.to_string()),
            }),
        ),
    }
}
