//! Shared server state.
//!
//! DESIGN
//! ======
//! `ServerState` is injected into Axum handlers via the `State` extractor.
//! It holds the configuration, the dispatcher and the set of connected
//! clients. Each client is represented by the sender half of its outbound
//! channel; whatever is pushed there is written to that client's socket by
//! its connection loop.

use std::collections::HashMap;
use std::sync::Arc;

use frames::{Frame, ProtocolError, validate_kind};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;

/// Outbound queue depth per client.
pub const CLIENT_QUEUE_DEPTH: usize = 256;

/// Clone is required by Axum; all inner fields are Arc-wrapped or Copy.
#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub dispatcher: Arc<Dispatcher>,
    clients: Arc<RwLock<HashMap<Uuid, mpsc::Sender<Frame>>>>,
}

impl ServerState {
    #[must_use]
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        Self { config, dispatcher: Arc::new(dispatcher), clients: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn register_client(&self, client_id: Uuid, tx: mpsc::Sender<Frame>) {
        self.clients.write().await.insert(client_id, tx);
    }

    pub async fn unregister_client(&self, client_id: Uuid) {
        self.clients.write().await.remove(&client_id);
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Push an EVENT to every connected client. Returns how many accepted it.
    ///
    /// Best-effort: a client whose queue is full is skipped.
    ///
    /// # Errors
    ///
    /// Returns the kind-syntax error when `kind` is not `namespace:path`.
    pub async fn broadcast_event(&self, kind: &str, payload: impl Into<Vec<u8>>) -> Result<usize, ProtocolError> {
        validate_kind(kind)?;
        Ok(self.relay(&Frame::event(kind, payload), None).await)
    }

    /// Queue `frame` for every client except `exclude`. Returns how many
    /// accepted it.
    pub async fn relay(&self, frame: &Frame, exclude: Option<Uuid>) -> usize {
        let clients = self.clients.read().await;
        clients
            .iter()
            .filter(|(client_id, _)| exclude != Some(**client_id))
            .filter(|(_, tx)| tx.try_send(frame.clone()).is_ok())
            .count()
    }

    /// Push an EVENT to one client. Returns `false` if it is gone or its queue
    /// is full.
    ///
    /// # Errors
    ///
    /// Returns the kind-syntax error when `kind` is not `namespace:path`.
    pub async fn send_event(
        &self,
        client_id: Uuid,
        kind: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<bool, ProtocolError> {
        validate_kind(kind)?;
        let clients = self.clients.read().await;
        let Some(tx) = clients.get(&client_id) else {
            return Ok(false);
        };
        Ok(tx.try_send(Frame::event(kind, payload)).is_ok())
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
