//! Kind-based request routing.
//!
//! DESIGN
//! ======
//! A `Dispatcher` maps a `namespace:path` kind to one [`Handler`]. Handlers
//! are pure business logic: they take a [`Request`] and return the response
//! payload or a [`HandlerError`]. Turning that into a RESPONSE frame with the
//! request's id and kind is the dispatcher's job, so a handler can never
//! break correlation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use frames::{Frame, FrameType, ProtocolError, status, validate_kind};
use tracing::{debug, warn};
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

/// One inbound REQUEST as seen by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Connection the request arrived on.
    pub client_id: Uuid,
    pub request_id: u64,
    pub kind: String,
    pub payload: Vec<u8>,
}

/// Handler failure, sent back as a RESPONSE with a nonzero status and the
/// message as UTF-8 payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("status {status}: {message}")]
pub struct HandlerError {
    status: u8,
    message: String,
}

impl HandlerError {
    /// A `status` of zero is promoted to [`status::INTERNAL`].
    pub fn new(status: u8, message: impl Into<String>) -> Self {
        let status = if status == status::OK { status::INTERNAL } else { status };
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(status::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(status::INTERNAL, message)
    }

    #[must_use]
    pub fn status(&self) -> u8 {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type HandlerResult = Result<Vec<u8>, HandlerError>;

#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, request: Request) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait::async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, request: Request) -> HandlerResult {
        (self.0)(request).await
    }
}

/// Build a [`Handler`] from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> impl Handler
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler(f)
}

// =============================================================================
// DISPATCHER
// =============================================================================

#[derive(Default, Clone)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `kind` to `handler`, replacing any previous handler for it.
    ///
    /// # Errors
    ///
    /// Returns the kind-syntax error when `kind` is not `namespace:path`.
    pub fn register<H>(&mut self, kind: &str, handler: H) -> Result<(), ProtocolError>
    where
        H: Handler + 'static,
    {
        validate_kind(kind)?;
        self.handlers.insert(kind.to_owned(), Arc::new(handler));
        Ok(())
    }

    #[must_use]
    pub fn handles(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Run the handler for a REQUEST frame and build its RESPONSE.
    ///
    /// Unknown kinds get [`status::UNKNOWN_KIND`]; handler failures get the
    /// handler's status. The reply always echoes `request_id` and `kind`.
    pub async fn dispatch(&self, client_id: Uuid, frame: Frame) -> Frame {
        let request_id = frame.request_id();
        let kind = frame.kind().to_owned();

        let Some(handler) = self.handlers.get(&kind).cloned() else {
            debug!(%client_id, request_id, %kind, "dispatch: unknown kind");
            let message = format!("unknown kind: {kind}");
            return response(request_id, kind, status::UNKNOWN_KIND, message.into_bytes());
        };

        let request = Request { client_id, request_id, kind: kind.clone(), payload: frame.into_payload() };
        match handler.call(request).await {
            Ok(payload) => response(request_id, kind, status::OK, payload),
            Err(err) => {
                warn!(%client_id, request_id, %kind, status = err.status, error = %err.message, "dispatch: handler failed");
                response(request_id, kind, err.status, err.message.into_bytes())
            }
        }
    }
}

fn response(request_id: u64, kind: String, status: u8, payload: Vec<u8>) -> Frame {
    Frame::new(FrameType::Response, 0, status, request_id, kind, payload)
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
