//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The dispatcher is reachable at `/ws` (ECWS/1 over WebSocket); `/healthz`
//! answers plain HTTP liveness probes.

pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::ServerState;

/// Path the WebSocket endpoint is mounted on.
pub const WS_PATH: &str = "/ws";

pub fn app(state: ServerState) -> Router {
    Router::new()
        .route(WS_PATH, get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
