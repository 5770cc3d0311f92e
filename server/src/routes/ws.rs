//! WebSocket handler: one ECWS/1 peer per connection.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID, registers the client's outbound queue
//! and enters a `select!` loop:
//! - Incoming binary messages → decode + classify into an `Inbound`
//! - Queued frames (handler replies, relayed/pushed events) → write to socket
//!
//! Classification is pure; the loop owns every outbound concern. REQUEST
//! frames are dispatched on their own task so a slow handler does not hold
//! up the connection; the reply comes back through the queue.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register outbound queue
//! 2. REQUEST → dispatcher task → RESPONSE via queue
//! 3. HEARTBEAT → echo (if enabled); EVENT → relay to peers (if enabled)
//! 4. Text or undecodable message → close 1002 → cleanup
//! 5. Close → abort in-flight handlers → unregister

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code};
use axum::response::Response;
use frames::{Codec, Frame, FrameType, ProtocolError, status};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::{CLIENT_QUEUE_DEPTH, ServerState};

// =============================================================================
// INBOUND
// =============================================================================

/// What the connection loop should do with one inbound message.
#[derive(Debug, PartialEq)]
enum Inbound {
    /// Run the handler; its RESPONSE is queued when done.
    Dispatch(Frame),
    /// Write this frame back to the sender now.
    Reply(Frame),
    /// Forward this frame to every other client.
    Relay(Frame),
    Ignore,
    /// Fatal for the connection: close with 1002.
    Violation(ProtocolError),
}

fn classify(state: &ServerState, codec: &Codec, client_id: Uuid, bytes: &[u8]) -> Inbound {
    let frame = match codec.decode(bytes) {
        Ok(frame) => frame,
        Err(err) => return Inbound::Violation(err),
    };

    match frame.frame_type() {
        FrameType::Request => Inbound::Dispatch(frame),
        FrameType::Heartbeat if state.config.echo_heartbeats => Inbound::Reply(Frame::heartbeat()),
        FrameType::Heartbeat => Inbound::Ignore,
        FrameType::Event if state.config.relay_events => Inbound::Relay(frame),
        FrameType::Event | FrameType::Response => {
            debug!(%client_id, frame_type = ?frame.frame_type(), kind = frame.kind(), "ws: ignoring frame");
            Inbound::Ignore
        }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<ServerState>, ws: WebSocketUpgrade) -> Response {
    // One ECWS/1 frame is one WebSocket message, so both transport limits
    // track the codec limit.
    ws.max_message_size(state.config.max_frame_size)
        .max_frame_size(state.config.max_frame_size)
        .on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: ServerState) {
    let client_id = Uuid::new_v4();
    let codec = Codec::new(state.config.max_frame_size);

    // Per-connection queue for replies and frames pushed by peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(CLIENT_QUEUE_DEPTH);
    state.register_client(client_id, client_tx.clone()).await;
    info!(%client_id, "ws: client connected");

    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let inbound = match msg {
                    Message::Binary(bytes) => classify(&state, &codec, client_id, &bytes),
                    Message::Text(_) => Inbound::Violation(ProtocolError::NonBinaryMessage),
                    Message::Close(_) => break,
                    _ => continue,
                };
                match inbound {
                    Inbound::Dispatch(frame) => {
                        let dispatcher = state.dispatcher.clone();
                        let tx = client_tx.clone();
                        in_flight.spawn(async move {
                            let reply = dispatcher.dispatch(client_id, frame).await;
                            let _ = tx.send(reply).await;
                        });
                    }
                    Inbound::Reply(frame) => {
                        if send_frame(&mut socket, &codec, &frame).await.is_err() {
                            break;
                        }
                    }
                    Inbound::Relay(frame) => {
                        let delivered = state.relay(&frame, Some(client_id)).await;
                        debug!(%client_id, kind = frame.kind(), delivered, "ws: relayed event");
                    }
                    Inbound::Ignore => {}
                    Inbound::Violation(err) => {
                        warn!(%client_id, error = %err, "ws: protocol violation; closing");
                        let close = CloseFrame {
                            code: close_code::PROTOCOL,
                            reason: Utf8Bytes::from_static("protocol violation"),
                        };
                        let _ = socket.send(Message::Close(Some(close))).await;
                        break;
                    }
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &codec, &frame).await.is_err() {
                    break;
                }
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    in_flight.abort_all();
    state.unregister_client(client_id).await;
    info!(%client_id, "ws: client disconnected");
}

/// Encode and write one frame. A RESPONSE too large to encode is replaced by
/// an INTERNAL error reply so the caller is not left waiting.
async fn send_frame(socket: &mut WebSocket, codec: &Codec, frame: &Frame) -> Result<(), axum::Error> {
    let bytes = match codec.encode(frame) {
        Ok(bytes) => bytes,
        Err(err) if frame.frame_type() == FrameType::Response => {
            warn!(request_id = frame.request_id(), kind = frame.kind(), error = %err, "ws: reply not encodable");
            match codec.encode(&frame.error_reply(status::INTERNAL, format!("response not encodable: {err}"))) {
                Ok(bytes) => bytes,
                Err(_) => return Ok(()),
            }
        }
        Err(err) => {
            warn!(kind = frame.kind(), error = %err, "ws: dropping unencodable frame");
            return Ok(());
        }
    };
    socket.send(Message::Binary(bytes.into())).await
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
