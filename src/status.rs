//! Read-only REST endpoints reporting the bot's runtime status.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::dispatcher::Dispatcher;

/// Shared state for status routes.
#[derive(Clone)]
pub struct StatusRouteState {
    pub dispatcher: Arc<Dispatcher>,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    active_backend: String,
    /// Successful backend swaps since startup.
    backend_version: u64,
    backends: Vec<String>,
    sessions: usize,
}

#[derive(Debug, Serialize)]
struct BackendsBody {
    active: String,
    available: Vec<String>,
}

/// GET /api/status
async fn get_status(State(state): State<StatusRouteState>) -> impl IntoResponse {
    let backends = state.dispatcher.backends();
    Json(StatusBody {
        active_backend: backends.current_name().await,
        backend_version: backends.version(),
        backends: backends.available(),
        sessions: state.dispatcher.sessions().len().await,
    })
}

/// GET /api/backends
async fn get_backends(State(state): State<StatusRouteState>) -> impl IntoResponse {
    let backends = state.dispatcher.backends();
    Json(BackendsBody {
        active: backends.current_name().await,
        available: backends.available(),
    })
}

/// Build the status REST routes.
pub fn status_routes(state: StatusRouteState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/backends", get(get_backends))
        .with_state(state)
}

/// Serve the status routes until the process exits.
pub async fn serve(port: u16, state: StatusRouteState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "Status server started");
    axum::serve(listener, status_routes(state)).await
}
