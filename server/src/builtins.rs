//! Handlers every server registers: `sys:ping` and `sys:time`.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::dispatch::{Dispatcher, HandlerError, HandlerResult, Request, handler_fn};

pub const PING: &str = "sys:ping";
pub const TIME: &str = "sys:time";

/// Echo the request payload.
async fn ping(req: Request) -> HandlerResult {
    Ok(req.payload)
}

/// Current UNIX time in milliseconds, as ASCII digits.
async fn time(_req: Request) -> HandlerResult {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| HandlerError::internal(format!("clock before epoch: {e}")))?;
    Ok(now.as_millis().to_string().into_bytes())
}

/// Dispatcher with the built-in handlers registered.
#[must_use]
pub fn dispatcher() -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    register(&mut dispatcher);
    dispatcher
}

pub fn register(dispatcher: &mut Dispatcher) {
    for (kind, result) in [
        (PING, dispatcher.register(PING, handler_fn(ping))),
        (TIME, dispatcher.register(TIME, handler_fn(time))),
    ] {
        if let Err(err) = result {
            tracing::error!(kind, error = %err, "builtins: invalid kind");
        }
    }
}
