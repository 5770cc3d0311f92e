//! ECWS/1 client: binary-framed request/response and events over WebSocket.
//!
//! This crate owns the connection engine. The wire format itself lives in the
//! `frames` crate and is re-exported here so callers need only one import.
//!
//! ```no_run
//! # async fn demo() -> ecws::Result<()> {
//! use std::time::Duration;
//!
//! let client = ecws::Client::new(ecws::ClientConfig::default());
//! client.connect("ws://127.0.0.1:3000/ws").await?;
//! let reply = client.send_async("sys:ping", b"hello".to_vec()).await?;
//! assert_eq!(reply.payload, b"hello");
//! client.close(Duration::from_secs(1)).await
//! # }
//! ```

mod backoff;
mod client;
mod config;
mod error;
mod listeners;
mod metrics;
mod pending;
mod state;

pub use client::{Client, ClientBuilder};
pub use config::{
    ClientConfig, ClientConfigBuilder, ConfigError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_MAX_BACKOFF, DEFAULT_MIN_BACKOFF, DEFAULT_RECONNECT_JITTER, DEFAULT_REQUEST_TIMEOUT,
};
pub use error::{ClientError, Result};
pub use frames::{Frame, FrameType, ProtocolError, split_kind, status, validate_kind};
pub use listeners::{CallbackExecutor, Event, ExceptionHandler, Job, ListenerId, LoggingExceptionHandler, SerialExecutor};
pub use metrics::MetricsSnapshot;
pub use pending::Response;
pub use state::ConnectionState;
