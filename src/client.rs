//! ECWS/1 connection engine.
//!
//! DESIGN
//! ======
//! `Client` is a cheap handle over a shared `Inner`. Background tasks (reader,
//! heartbeat, per-request timers, reconnect loop) hold only a `Weak` to it, so
//! dropping the last handle tears the connection down.
//!
//! A connected transport is a `Session`: the write half behind an async mutex
//! plus the reader and heartbeat tasks. Sessions carry a generation number; a
//! reader that outlives its session (caller closed, or a newer session is
//! installed) finds a different generation and does nothing on exit.
//!
//! Lock order: `session` before `state`. State transitions and the listener
//! notifications they produce are submitted under the `state` lock, so the
//! callback executor sees them in the order they happened.
//!
//! Every outstanding request is completed by exactly one of: its RESPONSE,
//! its timer, or a drain on close/loss. See `pending.rs`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use frames::{Codec, Frame, FrameType, ProtocolError, validate_kind};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::error::{CapacityError, Error as WsError};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::listeners::{
    CallbackExecutor, Event, ExceptionHandler, ListenerId, ListenerRegistry, LoggingExceptionHandler,
    SerialExecutor,
};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pending::{PendingRequest, PendingTable, Response};
use crate::state::{ConnectionState, StateCell};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Outcome slot shared by every caller waiting on the same connect attempt.
type ConnectOutcome = watch::Receiver<Option<Result<()>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// CLIENT
// =============================================================================

/// Handle to one ECWS/1 connection. Clones share the same connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

/// Builder for [`Client`] with custom callback plumbing.
pub struct ClientBuilder {
    config: ClientConfig,
    handler: Option<Arc<dyn ExceptionHandler>>,
    executor: Option<Arc<dyn CallbackExecutor>>,
}

impl ClientBuilder {
    /// Receive connection, protocol, remote and timeout errors.
    #[must_use]
    pub fn exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Run listener and exception-handler callbacks on `executor` instead of
    /// the default serial callback task.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn build(self) -> Client {
        let runtime = Handle::current();
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(SerialExecutor::spawn()));
        let handler = self
            .handler
            .unwrap_or_else(|| Arc::new(LoggingExceptionHandler));
        let backoff = Backoff::new(
            self.config.min_backoff(),
            self.config.max_backoff(),
            self.config.reconnect_jitter(),
        );
        Client {
            inner: Arc::new(Inner {
                codec: Codec::new(self.config.max_frame_size()),
                config: self.config,
                runtime,
                state: Mutex::new(StateCell::new()),
                pending: PendingTable::new(),
                metrics: Metrics::new(),
                listeners: ListenerRegistry::new(),
                executor,
                handler,
                next_request_id: AtomicU64::new(1),
                generation: AtomicU64::new(0),
                session: Mutex::new(None),
                connecting: Mutex::new(None),
                endpoint: Mutex::new(None),
                user_closed: AtomicBool::new(false),
                backoff: Mutex::new(backoff),
                reconnect_task: Mutex::new(None),
            }),
        }
    }
}

impl Client {
    /// Client with the default exception handler and callback executor.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::builder(config).build()
    }

    #[must_use]
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder { config, handler: None, executor: None }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Open a transport to `endpoint` (a `ws://host:port/path` URI).
    ///
    /// Returns immediately when already connected. A caller arriving while a
    /// connect is in flight waits for that same attempt.
    ///
    /// # Errors
    ///
    /// `Connection` when the transport cannot be opened within the connect
    /// timeout, `Closed` when the client is closing or was closed mid-connect.
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        self.inner.connect(endpoint, true).await
    }

    /// Gracefully close the connection, failing every pending request with
    /// `Closed`. The state is `Closed` on return whatever the outcome.
    ///
    /// # Errors
    ///
    /// `Connection` when the close handshake fails or exceeds `timeout`.
    pub async fn close(&self, timeout: Duration) -> Result<()> {
        self.inner.close(timeout).await
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Send a REQUEST with the configured request timeout.
    ///
    /// # Errors
    ///
    /// See [`Client::send_with_timeout`].
    pub async fn send_async(&self, kind: &str, payload: impl Into<Vec<u8>>) -> Result<Response> {
        self.send_with_timeout(kind, payload, self.inner.config.request_timeout())
            .await
    }

    /// Send a REQUEST and wait for its RESPONSE for at most `timeout`.
    ///
    /// # Errors
    ///
    /// `Protocol` for a malformed kind or an oversized frame, `Closed` when
    /// not connected or the connection ends first, `Connection` when the
    /// write fails, `Remote` for a nonzero status, `Timeout` when no
    /// response arrives in time.
    pub async fn send_with_timeout(
        &self,
        kind: &str,
        payload: impl Into<Vec<u8>>,
        timeout: Duration,
    ) -> Result<Response> {
        let inner = &self.inner;
        validate_kind(kind)?;
        let session = inner.current_session()?;

        let request_id = inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let bytes = inner.codec.encode(&Frame::request(request_id, kind, payload))?;

        let (tx, rx) = oneshot::channel();
        if let Err(duplicate) = inner
            .pending
            .insert(request_id, PendingRequest::new(kind, timeout, tx))
        {
            duplicate.discard();
            return Err(ClientError::connection(format!("request id {request_id} already pending")));
        }
        let timer = tokio::spawn(expire(Arc::downgrade(inner), request_id, timeout));
        inner.pending.arm_timer(request_id, timer.abort_handle());
        inner.metrics.record_request_sent();

        if let Err(err) = inner.send_bytes(&session, bytes).await {
            if let Some(request) = inner.pending.remove(request_id) {
                request.discard();
            }
            return Err(err);
        }
        debug!(request_id, kind, "ecws: request sent");

        rx.await
            .unwrap_or_else(|_| Err(ClientError::closed("request abandoned")))
    }

    /// Blocking variant of [`Client::send_with_timeout`].
    ///
    /// Must be called from outside async context (a plain thread or
    /// `spawn_blocking`); the request itself runs on the client's runtime.
    ///
    /// # Errors
    ///
    /// Same as [`Client::send_with_timeout`].
    pub fn send_sync(&self, kind: &str, payload: impl Into<Vec<u8>>, timeout: Duration) -> Result<Response> {
        let client = self.clone();
        let kind = kind.to_owned();
        let payload = payload.into();
        let (tx, rx) = oneshot::channel();
        self.inner.runtime.spawn(async move {
            let _ = tx.send(client.send_with_timeout(&kind, payload, timeout).await);
        });
        rx.blocking_recv()
            .unwrap_or_else(|_| Err(ClientError::closed("runtime shut down")))
    }

    /// Send a fire-and-forget EVENT.
    ///
    /// # Errors
    ///
    /// `Protocol` for a malformed kind or oversized frame, `Closed` when not
    /// connected, `Connection` when the write fails.
    pub async fn send_event(&self, kind: &str, payload: impl Into<Vec<u8>>) -> Result<()> {
        let inner = &self.inner;
        validate_kind(kind)?;
        let session = inner.current_session()?;
        let bytes = inner.codec.encode(&Frame::event(kind, payload))?;
        inner.send_bytes(&session, bytes).await?;
        inner.metrics.record_event_sent();
        Ok(())
    }

    /// Listen for EVENT frames of one kind.
    pub fn on_event<F>(&self, kind: &str, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.listeners.add_event(kind, Arc::new(listener))
    }

    /// Listen for every EVENT frame.
    pub fn on_any_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.listeners.add_any(Arc::new(listener))
    }

    /// Listen for `(previous, current)` state transitions.
    pub fn on_state_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    {
        self.inner.listeners.add_state(Arc::new(listener))
    }

    /// Returns `false` when `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner
            .metrics
            .snapshot(self.state(), self.inner.pending.len())
    }
}

// =============================================================================
// SESSION
// =============================================================================

struct Session {
    generation: u64,
    sink: tokio::sync::Mutex<WsSink>,
    reader: Mutex<Option<JoinHandle<()>>>,
    reader_abort: AbortHandle,
    heartbeat: Mutex<Option<AbortHandle>>,
}

impl Session {
    fn stop_heartbeat(&self) {
        if let Some(task) = lock(&self.heartbeat).take() {
            task.abort();
        }
    }

    fn abort_tasks(&self) {
        self.stop_heartbeat();
        self.reader_abort.abort();
    }

    async fn send_close(&self, code: CloseCode, reason: &'static str) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
            .await
            .map_err(|err| ClientError::connection(format!("close failed: {err}")))
    }

    /// Send a normal close and wait for the peer to finish the handshake.
    async fn shutdown(&self) -> Result<()> {
        self.send_close(CloseCode::Normal, "client closing").await?;
        let reader = lock(&self.reader).take();
        if let Some(reader) = reader {
            let _ = reader.await;
        }
        Ok(())
    }
}

// =============================================================================
// ENGINE
// =============================================================================

struct Inner {
    config: ClientConfig,
    codec: Codec,
    runtime: Handle,
    state: Mutex<StateCell>,
    pending: PendingTable,
    metrics: Metrics,
    listeners: ListenerRegistry,
    executor: Arc<dyn CallbackExecutor>,
    handler: Arc<dyn ExceptionHandler>,
    next_request_id: AtomicU64,
    generation: AtomicU64,
    session: Mutex<Option<Arc<Session>>>,
    connecting: Mutex<Option<ConnectOutcome>>,
    endpoint: Mutex<Option<String>>,
    user_closed: AtomicBool,
    backoff: Mutex<Backoff>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn state(&self) -> ConnectionState {
        lock(&self.state).get()
    }

    /// Move to `next` and notify state listeners. No-op when unchanged.
    fn transition(&self, next: ConnectionState) {
        let mut cell = lock(&self.state);
        let Some((previous, current)) = cell.set(next) else {
            return;
        };
        debug!(from = %previous, to = %current, "ecws: state changed");
        for listener in self.listeners.state_listeners() {
            self.executor
                .execute(Box::new(move || listener(previous, current)));
        }
    }

    /// Hand `err` to the exception handler on the callback context.
    fn report(&self, err: ClientError) {
        let handler = Arc::clone(&self.handler);
        self.executor.execute(Box::new(move || match &err {
            ClientError::Connection(_) | ClientError::Closed(_) => handler.on_connection_error(&err),
            ClientError::Protocol(_) => handler.on_protocol_error(&err),
            ClientError::Remote { .. } => handler.on_remote_error(&err),
            ClientError::Timeout { .. } => handler.on_timeout(&err),
        }));
    }

    fn current_session(&self) -> Result<Arc<Session>> {
        if self.state() != ConnectionState::Connected {
            return Err(ClientError::closed("not connected"));
        }
        lock(&self.session)
            .clone()
            .ok_or_else(|| ClientError::closed("not connected"))
    }

    async fn send_bytes(&self, session: &Session, bytes: Vec<u8>) -> Result<()> {
        self.metrics.record_frame_sent(bytes.len());
        session
            .sink
            .lock()
            .await
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|err| ClientError::connection(format!("send failed: {err}")))
    }

    fn fail_pending(&self, reason: &str) {
        for (request_id, request) in self.pending.drain() {
            debug!(request_id, kind = %request.kind, reason, "ecws: failing pending request");
            request.complete(Err(ClientError::closed(reason)));
        }
    }

    // -------------------------------------------------------------------------
    // Connect
    // -------------------------------------------------------------------------

    /// `by_caller` distinguishes an explicit `connect` (which clears a previous
    /// close) from a reconnect attempt (which must respect it).
    async fn connect(self: &Arc<Self>, endpoint: &str, by_caller: bool) -> Result<()> {
        let mut outcome = {
            let mut slot = lock(&self.connecting);
            if let Some(in_flight) = slot.as_ref() {
                in_flight.clone()
            } else {
                let state = self.state();
                if state == ConnectionState::Connected {
                    return Ok(());
                }
                if !state.can_connect() {
                    return Err(ClientError::closed(format!("cannot connect while {state}")));
                }
                if by_caller {
                    self.user_closed.store(false, Ordering::SeqCst);
                } else if self.user_closed.load(Ordering::SeqCst) {
                    return Err(ClientError::closed("client closed"));
                }
                *lock(&self.endpoint) = Some(endpoint.to_owned());

                let (tx, rx) = watch::channel(None);
                *slot = Some(rx.clone());
                let inner = Arc::clone(self);
                let endpoint = endpoint.to_owned();
                tokio::spawn(async move {
                    let result = inner.establish(&endpoint).await;
                    *lock(&inner.connecting) = None;
                    let _ = tx.send(Some(result));
                });
                rx
            }
        };

        let settled = outcome
            .wait_for(Option::is_some)
            .await
            .map(|value| (*value).clone());
        match settled {
            Ok(Some(result)) => result,
            _ => Err(ClientError::connection("connect attempt abandoned")),
        }
    }

    async fn establish(self: &Arc<Self>, endpoint: &str) -> Result<()> {
        self.transition(ConnectionState::Connecting);
        info!(endpoint, "ecws: connecting");

        let connect_timeout = self.config.connect_timeout();
        let opening = connect_async_with_config(endpoint, Some(self.transport_config()), false);
        let stream = match tokio::time::timeout(connect_timeout, opening).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(err)) => return Err(self.connect_failed(format!("connect to {endpoint} failed: {err}"))),
            Err(_) => {
                return Err(self.connect_failed(format!(
                    "connect to {endpoint} timed out after {connect_timeout:?}"
                )));
            }
        };

        let (sink, source) = stream.split();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            // Held until CONNECTED so a reader that fails immediately
            // reports its loss after the transition, not before. `close`
            // sets the flag before taking this lock.
            let mut slot = lock(&self.session);
            if self.user_closed.load(Ordering::SeqCst) {
                self.transition(ConnectionState::Closed);
                return Err(ClientError::closed("closed while connecting"));
            }
            let reader = tokio::spawn(read_loop(Arc::downgrade(self), generation, source));
            let session = Arc::new(Session {
                generation,
                sink: tokio::sync::Mutex::new(sink),
                reader_abort: reader.abort_handle(),
                reader: Mutex::new(Some(reader)),
                heartbeat: Mutex::new(None),
            });
            if let Some(interval) = self.config.heartbeat_interval() {
                let task = tokio::spawn(heartbeat_loop(
                    Arc::downgrade(self),
                    Arc::downgrade(&session),
                    interval,
                ));
                *lock(&session.heartbeat) = Some(task.abort_handle());
            }
            *slot = Some(session);
            self.transition(ConnectionState::Connected);
        }
        lock(&self.backoff).reset();
        info!(endpoint, generation, "ecws: connected");
        Ok(())
    }

    /// One ECWS/1 frame is one WebSocket message, so the transport limits
    /// follow the codec limit instead of tungstenite's defaults.
    fn transport_config(&self) -> WebSocketConfig {
        let max = self.config.max_frame_size();
        WebSocketConfig::default()
            .max_message_size(Some(max))
            .max_frame_size(Some(max))
    }

    fn connect_failed(&self, message: String) -> ClientError {
        warn!(error = %message, "ecws: connect failed");
        let next = if self.user_closed.load(Ordering::SeqCst) {
            ConnectionState::Closed
        } else {
            ConnectionState::Failed
        };
        self.transition(next);
        let err = ClientError::connection(message);
        self.report(err.clone());
        err
    }

    // -------------------------------------------------------------------------
    // Close / loss
    // -------------------------------------------------------------------------

    async fn close(&self, timeout: Duration) -> Result<()> {
        self.user_closed.store(true, Ordering::SeqCst);
        if let Some(task) = lock(&self.reconnect_task).take() {
            task.abort();
        }

        let session = lock(&self.session).take();
        let Some(session) = session else {
            self.fail_pending("connection closed");
            self.transition(ConnectionState::Closed);
            return Ok(());
        };

        self.transition(ConnectionState::Closing);
        session.stop_heartbeat();
        let graceful = tokio::time::timeout(timeout, session.shutdown()).await;
        session.abort_tasks();
        self.fail_pending("connection closed");
        self.transition(ConnectionState::Closed);
        info!(generation = session.generation, "ecws: closed");

        match graceful {
            Ok(result) => result,
            Err(_) => Err(ClientError::connection(format!("close timed out after {timeout:?}"))),
        }
    }

    /// Reader exit for session `generation`. Ignored if that session is no
    /// longer current.
    fn transport_lost(self: &Arc<Self>, generation: u64, cause: &str) {
        let session = {
            let mut slot = lock(&self.session);
            if slot.as_ref().map(|s| s.generation) != Some(generation) {
                return;
            }
            slot.take()
        };
        if let Some(session) = session {
            session.stop_heartbeat();
        }

        warn!(cause, generation, "ecws: connection lost");
        self.transition(ConnectionState::Failed);
        self.report(ClientError::connection(format!("connection lost: {cause}")));
        self.fail_pending("connection lost");

        if self.config.auto_reconnect() && !self.user_closed.load(Ordering::SeqCst) {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let Some(endpoint) = lock(&self.endpoint).clone() else {
            return;
        };
        let mut slot = lock(&self.reconnect_task);
        // A previous loop can only still exist if it connected and has not
        // yet returned.
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(reconnect_loop(Arc::downgrade(self), endpoint)));
    }

    async fn protocol_violation(&self, generation: u64, err: ProtocolError) {
        warn!(error = %err, generation, "ecws: protocol violation; closing transport");
        self.metrics.record_protocol_error();
        self.report(ClientError::Protocol(err));

        let session = lock(&self.session)
            .clone()
            .filter(|s| s.generation == generation);
        if let Some(session) = session {
            let _ = session
                .send_close(CloseCode::Protocol, "protocol violation")
                .await;
        }
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    fn handle_frame(&self, frame: Frame) {
        match frame.frame_type() {
            FrameType::Response => self.complete_request(frame),
            FrameType::Event => self.dispatch_event(frame),
            FrameType::Heartbeat => self.metrics.record_heartbeat_received(Instant::now()),
            FrameType::Request => {
                debug!(
                    request_id = frame.request_id(),
                    kind = frame.kind(),
                    "ecws: ignoring inbound request"
                );
            }
        }
    }

    fn complete_request(&self, frame: Frame) {
        self.metrics.record_response_received();
        let request_id = frame.request_id();
        let Some(request) = self.pending.remove(request_id) else {
            self.metrics.record_late_response();
            debug!(request_id, kind = frame.kind(), "ecws: dropping response with no pending request");
            return;
        };
        self.metrics.record_rtt(request.started.elapsed());

        if frame.is_error() {
            let err = ClientError::Remote {
                status: frame.status(),
                kind: frame.kind().to_owned(),
                request_id,
                message: String::from_utf8_lossy(frame.payload()).into_owned(),
            };
            self.report(err.clone());
            request.complete(Err(err));
            return;
        }

        let status = frame.status();
        let kind = frame.kind().to_owned();
        request.complete(Ok(Response { status, request_id, kind, payload: frame.into_payload() }));
    }

    fn dispatch_event(&self, frame: Frame) {
        self.metrics.record_event_received();
        let listeners = self.listeners.event_listeners(frame.kind());
        if listeners.is_empty() {
            return;
        }
        let event = Arc::new(Event { kind: frame.kind().to_owned(), payload: frame.into_payload() });
        for listener in listeners {
            let event = Arc::clone(&event);
            self.executor.execute(Box::new(move || listener(&event)));
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let reconnect = self
            .reconnect_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = reconnect.take() {
            task.abort();
        }
        let session = self.session.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = session.take() {
            session.abort_tasks();
        }
    }
}

// =============================================================================
// BACKGROUND TASKS
// =============================================================================

async fn read_loop(inner: Weak<Inner>, generation: u64, mut source: WsSource) {
    let cause = loop {
        let Some(message) = source.next().await else {
            break "transport closed".to_owned();
        };
        let Some(engine) = inner.upgrade() else {
            return;
        };
        match message {
            Ok(Message::Binary(bytes)) => {
                engine.metrics.record_frame_received(bytes.len());
                match engine.codec.decode(&bytes) {
                    Ok(frame) => engine.handle_frame(frame),
                    Err(err) => {
                        let cause = format!("undecodable frame: {err}");
                        engine.protocol_violation(generation, err).await;
                        break cause;
                    }
                }
            }
            Ok(Message::Text(_)) => {
                engine
                    .protocol_violation(generation, ProtocolError::NonBinaryMessage)
                    .await;
                break "text message received".to_owned();
            }
            Ok(Message::Close(frame)) => {
                break match frame {
                    Some(frame) => format!("peer closed ({}): {}", u16::from(frame.code), frame.reason.as_str()),
                    None => "peer closed".to_owned(),
                };
            }
            // Ping/pong are answered by tungstenite itself.
            Ok(_) => {}
            Err(WsError::Capacity(CapacityError::MessageTooLong { size, max_size })) => {
                engine
                    .protocol_violation(generation, ProtocolError::TooLarge { size, max: max_size })
                    .await;
                break format!("oversized message: {size} bytes");
            }
            Err(err) => break format!("read failed: {err}"),
        }
    };
    if let Some(engine) = inner.upgrade() {
        engine.transport_lost(generation, &cause);
    }
}

async fn heartbeat_loop(inner: Weak<Inner>, session: Weak<Session>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let (Some(engine), Some(session)) = (inner.upgrade(), session.upgrade()) else {
            return;
        };
        if engine.state() != ConnectionState::Connected {
            return;
        }
        let bytes = match engine.codec.encode(&Frame::heartbeat()) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "ecws: heartbeat encode failed");
                return;
            }
        };
        if let Err(err) = engine.send_bytes(&session, bytes).await {
            debug!(error = %err, "ecws: heartbeat send failed");
            return;
        }
        engine.metrics.record_heartbeat_sent();
    }
}

async fn expire(inner: Weak<Inner>, request_id: u64, after: Duration) {
    tokio::time::sleep(after).await;
    let Some(engine) = inner.upgrade() else {
        return;
    };
    let Some(request) = engine.pending.remove(request_id) else {
        return;
    };
    engine.metrics.record_timeout();
    let err = ClientError::Timeout { kind: request.kind.clone(), request_id, timeout: request.timeout };
    debug!(request_id, kind = %request.kind, "ecws: request timed out");
    engine.report(err.clone());
    request.complete(Err(err));
}

async fn reconnect_loop(inner: Weak<Inner>, endpoint: String) {
    loop {
        let delay = match inner.upgrade() {
            Some(engine) => lock(&engine.backoff).next_delay(),
            None => return,
        };
        debug!(?delay, endpoint, "ecws: reconnect scheduled");
        tokio::time::sleep(delay).await;

        let Some(engine) = inner.upgrade() else {
            return;
        };
        if engine.user_closed.load(Ordering::SeqCst) {
            return;
        }
        engine.metrics.record_reconnect_attempt();
        match engine.connect(&endpoint, false).await {
            Ok(()) => {
                info!(endpoint, "ecws: reconnected");
                return;
            }
            Err(err) => debug!(error = %err, endpoint, "ecws: reconnect attempt failed"),
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
