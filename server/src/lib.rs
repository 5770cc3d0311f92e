//! ECWS/1 server-side peer.
//!
//! Accepts WebSocket connections, decodes frames with the shared `frames`
//! codec, routes REQUEST frames to handlers registered by kind and writes
//! back RESPONSE frames carrying the same request id and kind. Events can be
//! pushed to connected clients at any time through [`ServerState`].

pub mod builtins;
pub mod config;
pub mod dispatch;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use dispatch::{Dispatcher, Handler, HandlerError, HandlerResult, Request, handler_fn};
pub use state::ServerState;

use tokio::net::TcpListener;

/// Serve the dispatcher on an already-bound listener until the process ends.
///
/// # Errors
///
/// Returns the I/O error that stopped the accept loop.
pub async fn serve(listener: TcpListener, state: ServerState) -> std::io::Result<()> {
    axum::serve(listener, routes::app(state)).await
}
