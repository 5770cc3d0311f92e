//! Client engine against the real dispatcher and against misbehaving peers.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ecws::{Client, ClientConfig, ClientError, ConnectionState, Event, ExceptionHandler, ProtocolError};
use futures_util::{SinkExt, StreamExt};
use server::{HandlerError, Request, ServerConfig, ServerState, builtins, handler_fn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};

// =============================================================================
// HARNESS
// =============================================================================

fn config() -> ClientConfig {
    ClientConfig::builder()
        .request_timeout(Duration::from_secs(5))
        .connect_timeout(Duration::from_secs(2))
        .heartbeat_interval(Duration::ZERO)
        .auto_reconnect(false)
        .build()
        .expect("valid config")
}

fn delay_of(req: &Request) -> Duration {
    let millis = std::str::from_utf8(&req.payload)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    Duration::from_millis(millis)
}

const MIB: usize = 1024 * 1024;

/// Boot the dispatcher on an ephemeral port. Returns the endpoint URL.
async fn boot() -> (String, ServerState) {
    boot_with(ServerConfig::default()).await
}

async fn boot_with(config: ServerConfig) -> (String, ServerState) {
    let mut dispatcher = builtins::dispatcher();
    dispatcher
        .register("c:ping", handler_fn(|req: Request| async move { Ok(req.payload) }))
        .expect("valid kind");
    dispatcher
        .register(
            "user:get",
            handler_fn(|_req: Request| async { Err::<Vec<u8>, _>(HandlerError::new(7, "not found")) }),
        )
        .expect("valid kind");
    dispatcher
        .register(
            "test:delay",
            handler_fn(|req: Request| async move {
                sleep(delay_of(&req)).await;
                Ok(req.payload)
            }),
        )
        .expect("valid kind");
    dispatcher
        .register(
            "test:hang",
            handler_fn(|_req: Request| async {
                sleep(Duration::from_secs(60)).await;
                Ok(Vec::new())
            }),
        )
        .expect("valid kind");
    dispatcher
        .register(
            "test:blob",
            handler_fn(|req: Request| async move {
                match std::str::from_utf8(&req.payload).ok().and_then(|s| s.parse::<usize>().ok()) {
                    Some(len) => Ok(vec![0xAB; len]),
                    None => Err(HandlerError::bad_request("length expected")),
                }
            }),
        )
        .expect("valid kind");

    let state = ServerState::new(config, dispatcher);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let serve_state = state.clone();
    tokio::spawn(async move {
        let _ = server::serve(listener, serve_state).await;
    });
    (format!("ws://{addr}{}", server::routes::WS_PATH), state)
}

/// Raw WebSocket peer; `behave` runs once per accepted connection with its
/// zero-based index.
async fn spawn_peer<F, Fut>(behave: F) -> String
where
    F: Fn(usize, WebSocketStream<TcpStream>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let mut index = 0;
        while let Ok((tcp, _)) = listener.accept().await {
            if let Ok(ws) = accept_async(tcp).await {
                tokio::spawn(behave(index, ws));
            }
            index += 1;
        }
    });
    format!("ws://{addr}/")
}

async fn drain(mut ws: WebSocketStream<TcpStream>) {
    while let Some(Ok(_)) = ws.next().await {}
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let waited = timeout(Duration::from_secs(5), async {
        while !cond() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

async fn wait_for_clients(state: &ServerState, count: usize) {
    let waited = timeout(Duration::from_secs(5), async {
        while state.client_count().await < count {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {count} clients");
}

#[derive(Default)]
struct Recorder {
    codes: Mutex<Vec<&'static str>>,
}

impl Recorder {
    fn push(&self, err: &ClientError) {
        self.codes.lock().expect("recorder lock").push(err.error_code());
    }

    fn seen(&self, code: &str) -> bool {
        self.codes.lock().expect("recorder lock").contains(&code)
    }
}

impl ExceptionHandler for Recorder {
    fn on_connection_error(&self, err: &ClientError) {
        self.push(err);
    }
    fn on_protocol_error(&self, err: &ClientError) {
        self.push(err);
    }
    fn on_remote_error(&self, err: &ClientError) {
        self.push(err);
    }
    fn on_timeout(&self, err: &ClientError) {
        self.push(err);
    }
}

type Transitions = Arc<Mutex<Vec<(ConnectionState, ConnectionState)>>>;

fn record_transitions(client: &Client) -> Transitions {
    let seen: Transitions = Arc::default();
    let sink = Arc::clone(&seen);
    client.on_state_changed(move |from, to| sink.lock().expect("lock").push((from, to)));
    seen
}

fn snapshot(transitions: &Transitions) -> Vec<(ConnectionState, ConnectionState)> {
    transitions.lock().expect("lock").clone()
}

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_sync_echoes_kind_and_payload() {
    let (url, _state) = boot().await;
    let client = Client::new(config());
    client.connect(&url).await.expect("connect");

    let blocking = client.clone();
    let response = tokio::task::spawn_blocking(move || {
        blocking.send_sync("c:ping", b"hello".to_vec(), Duration::from_secs(5))
    })
    .await
    .expect("blocking task")
    .expect("response");

    assert_eq!(response.status, 0);
    assert_eq!(response.kind, "c:ping");
    assert_eq!(response.payload, b"hello");
    assert_eq!(response.request_id, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nonzero_status_is_a_remote_error() {
    let (url, _state) = boot().await;
    let recorder = Arc::new(Recorder::default());
    let client = Client::builder(config()).exception_handler(recorder.clone()).build();
    client.connect(&url).await.expect("connect");

    let blocking = client.clone();
    let err = tokio::task::spawn_blocking(move || blocking.send_sync("user:get", b"42".to_vec(), Duration::from_secs(5)))
        .await
        .expect("blocking task")
        .expect_err("remote error");

    match err {
        ClientError::Remote { status, kind, message, .. } => {
            assert_eq!(status, 7);
            assert_eq!(kind, "user:get");
            assert_eq!(message, "not found");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    wait_until("remote error reported", || recorder.seen("E_REMOTE")).await;
    assert!(client.is_connected(), "remote errors do not affect connection health");
}

#[tokio::test]
async fn concurrent_requests_resolve_to_their_own_responses() {
    let (url, _state) = boot().await;
    let client = Client::new(config());
    client.connect(&url).await.expect("connect");

    // Longest delay first, so responses arrive in reverse send order.
    let delays = [250u64, 200, 150, 100, 50, 0];
    let calls = delays.iter().map(|delay| {
        let client = client.clone();
        async move { client.send_async("test:delay", delay.to_string()).await }
    });
    let results = futures_util::future::join_all(calls).await;

    let mut ids = Vec::new();
    for (delay, result) in delays.iter().zip(results) {
        let response = result.expect("response");
        assert_eq!(response.text(), delay.to_string());
        ids.push(response.request_id);
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), delays.len(), "request ids are never reused");

    let metrics = client.metrics();
    assert_eq!(metrics.requests_sent, 6);
    assert_eq!(metrics.responses_received, 6);
    assert_eq!(metrics.pending_count, 0);
    assert!(metrics.last_rtt().is_some());
}

#[tokio::test]
async fn timeout_fails_only_its_own_request() {
    let (url, _state) = boot().await;
    let recorder = Arc::new(Recorder::default());
    let client = Client::builder(config()).exception_handler(recorder.clone()).build();
    client.connect(&url).await.expect("connect");

    let started = Instant::now();
    let hung = client.send_with_timeout("test:hang", Vec::new(), Duration::from_millis(200));
    let alive = async {
        sleep(Duration::from_millis(50)).await;
        client.send_async("c:ping", b"alive".to_vec()).await
    };
    let (hung, alive) = tokio::join!(hung, alive);

    match hung {
        Err(ClientError::Timeout { kind, timeout, .. }) => {
            assert_eq!(kind, "test:hang");
            assert_eq!(timeout, Duration::from_millis(200));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "fired late: {elapsed:?}");

    assert_eq!(alive.expect("unaffected request").payload, b"alive");
    assert!(client.is_connected());
    assert_eq!(client.metrics().timeouts, 1);
    assert_eq!(client.metrics().pending_count, 0);
    wait_until("timeout reported", || recorder.seen("E_TIMEOUT")).await;
}

#[tokio::test]
async fn late_response_is_dropped_and_counted() {
    let (url, _state) = boot().await;
    let client = Client::new(config());
    client.connect(&url).await.expect("connect");

    let err = client
        .send_with_timeout("test:delay", "300", Duration::from_millis(100))
        .await
        .expect_err("times out");
    assert!(matches!(err, ClientError::Timeout { .. }));

    wait_until("late response", || client.metrics().late_responses == 1).await;
    assert_eq!(client.metrics().responses_received, 1);
    assert!(client.is_connected());
}

#[tokio::test]
async fn unknown_kind_surfaces_status() {
    let (url, _state) = boot().await;
    let client = Client::new(config());
    client.connect(&url).await.expect("connect");

    let err = client.send_async("no:such", Vec::new()).await.expect_err("unknown kind");
    assert!(matches!(err, ClientError::Remote { status: ecws::status::UNKNOWN_KIND, .. }));
}

#[tokio::test]
async fn frames_above_transport_default_round_trip_under_larger_max() {
    let (url, _state) = boot_with(ServerConfig { max_frame_size: 40 * MIB, ..ServerConfig::default() }).await;
    let config = ClientConfig::builder()
        .heartbeat_interval(Duration::ZERO)
        .auto_reconnect(false)
        .max_frame_size(40 * MIB)
        .build()
        .expect("valid config");
    let client = Client::new(config);
    client.connect(&url).await.expect("connect");

    let blob = client
        .send_with_timeout("test:blob", (20 * MIB).to_string(), Duration::from_secs(30))
        .await
        .expect("large response");
    assert_eq!(blob.payload.len(), 20 * MIB);
    assert!(blob.payload.iter().all(|b| *b == 0xAB));

    let echoed = client
        .send_with_timeout("c:ping", vec![7u8; 20 * MIB], Duration::from_secs(30))
        .await
        .expect("large request");
    assert_eq!(echoed.payload.len(), 20 * MIB);

    assert!(client.is_connected());
    assert_eq!(client.metrics().protocol_errors, 0);
}

#[tokio::test]
async fn message_above_client_max_is_a_protocol_violation() {
    let (url, _state) = boot_with(ServerConfig { max_frame_size: 40 * MIB, ..ServerConfig::default() }).await;
    let client = Client::new(config());
    client.connect(&url).await.expect("connect");

    let err = client
        .send_with_timeout("test:blob", (20 * MIB).to_string(), Duration::from_secs(30))
        .await
        .expect_err("oversized response");
    assert!(matches!(err, ClientError::Closed(_)), "got {err:?}");
    wait_until("failed state", || client.state() == ConnectionState::Failed).await;
    assert_eq!(client.metrics().protocol_errors, 1);
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test]
async fn close_drains_every_pending_request() {
    const K: usize = 5;
    let (url, _state) = boot().await;
    let client = Client::new(config());
    client.connect(&url).await.expect("connect");

    let handles: Vec<_> = (0..K)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.send_async("test:hang", Vec::new()).await })
        })
        .collect();
    wait_until("requests pending", || client.metrics().pending_count == K).await;

    client.close(Duration::from_secs(1)).await.expect("graceful close");
    assert_eq!(client.metrics().pending_count, 0);
    assert_eq!(client.state(), ConnectionState::Closed);

    for handle in handles {
        let result = handle.await.expect("request task");
        assert!(matches!(result, Err(ClientError::Closed(_))), "got {result:?}");
    }
}

#[tokio::test]
async fn close_timeout_still_forces_closed() {
    // Never reads, so the close handshake is never answered.
    let url = spawn_peer(|_, ws| async move {
        sleep(Duration::from_secs(30)).await;
        drop(ws);
    })
    .await;
    let client = Client::new(config());
    client.connect(&url).await.expect("connect");

    let waiter = client.clone();
    let pending = tokio::spawn(async move { waiter.send_async("c:ping", Vec::new()).await });
    wait_until("request pending", || client.metrics().pending_count == 1).await;

    let started = Instant::now();
    let err = client
        .close(Duration::from_millis(200))
        .await
        .expect_err("handshake never completes");
    assert!(matches!(err, ClientError::Connection(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.metrics().pending_count, 0);
    let result = pending.await.expect("request task");
    assert!(matches!(result, Err(ClientError::Closed(_))), "got {result:?}");
}

#[tokio::test]
async fn state_listeners_see_every_transition_in_order() {
    let (url, _state) = boot().await;
    let client = Client::new(config());
    let transitions = record_transitions(&client);

    client.connect(&url).await.expect("connect");
    client.close(Duration::from_secs(1)).await.expect("close");

    use ConnectionState::*;
    let expected = vec![(Closed, Connecting), (Connecting, Connected), (Connected, Closing), (Closing, Closed)];
    wait_until("four transitions", || snapshot(&transitions).len() == expected.len()).await;
    assert_eq!(snapshot(&transitions), expected);
}

#[tokio::test]
async fn concurrent_connects_share_one_attempt() {
    let (url, _state) = boot().await;
    let client = Client::new(config());
    let transitions = record_transitions(&client);

    let (first, second) = tokio::join!(client.connect(&url), client.connect(&url));
    first.expect("first connect");
    second.expect("second connect");
    client.connect(&url).await.expect("already connected");

    wait_until("connected", || snapshot(&transitions).len() == 2).await;
    let connecting = snapshot(&transitions)
        .iter()
        .filter(|(_, to)| *to == ConnectionState::Connecting)
        .count();
    assert_eq!(connecting, 1);
}

#[tokio::test]
async fn operations_require_a_connection() {
    let client = Client::new(config());

    let err = client.send_async("c:ping", Vec::new()).await.expect_err("not connected");
    assert!(matches!(err, ClientError::Closed(_)));
    let err = client.send_event("c:note", Vec::new()).await.expect_err("not connected");
    assert!(matches!(err, ClientError::Closed(_)));

    // Kind syntax is checked before connection state.
    let err = client.send_async("a:b:c", Vec::new()).await.expect_err("bad kind");
    assert!(matches!(err, ClientError::Protocol(ProtocolError::InvalidKind { .. })));

    client.close(Duration::from_secs(1)).await.expect("close without transport");
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn connect_failure_moves_to_failed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let recorder = Arc::new(Recorder::default());
    let client = Client::builder(config()).exception_handler(recorder.clone()).build();
    let err = client.connect(&format!("ws://{addr}/")).await.expect_err("refused");

    assert!(matches!(err, ClientError::Connection(_)));
    assert!(err.retryable());
    assert_eq!(client.state(), ConnectionState::Failed);
    wait_until("connection error reported", || recorder.seen("E_CONNECTION")).await;
}

#[tokio::test]
async fn heartbeats_flow_both_ways() {
    let (url, _state) = boot().await;
    let config = ClientConfig::builder()
        .heartbeat_interval(Duration::from_millis(50))
        .auto_reconnect(false)
        .build()
        .expect("valid config");
    let client = Client::new(config);
    client.connect(&url).await.expect("connect");

    wait_until("echoed heartbeats", || client.metrics().heartbeats_received >= 2).await;
    let metrics = client.metrics();
    assert!(metrics.heartbeats_sent >= 2);
    assert!(metrics.last_heartbeat_age_ms.is_some());
    assert_eq!(metrics.pending_count, 0, "heartbeats never create pending requests");
}

// =============================================================================
// EVENTS
// =============================================================================

#[tokio::test]
async fn pushed_events_reach_listeners_in_order() {
    let (url, state) = boot().await;
    let client = Client::new(config());
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    client.on_event("news:flash", move |event| {
        let _ = tx.send(event.clone());
    });
    let any = Arc::new(AtomicUsize::new(0));
    let any_count = Arc::clone(&any);
    client.on_any_event(move |_| {
        any_count.fetch_add(1, Ordering::SeqCst);
    });

    client.connect(&url).await.expect("connect");
    wait_for_clients(&state, 1).await;

    for i in 0..20 {
        state.broadcast_event("news:flash", i.to_string()).await.expect("valid kind");
    }
    state.broadcast_event("other:kind", "x").await.expect("valid kind");

    for i in 0..20 {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open");
        assert_eq!(event.kind, "news:flash");
        assert_eq!(event.payload, i.to_string().into_bytes());
    }
    wait_until("any-listener saw all", || any.load(Ordering::SeqCst) == 21).await;
    assert_eq!(client.metrics().events_received, 21);
}

#[tokio::test]
async fn removed_listener_is_not_called() {
    let (url, state) = boot().await;
    let client = Client::new(config());
    let removed_hits = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&removed_hits);
    let id = client.on_event("news:flash", move |_| {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    client.on_event("news:flash", move |event| {
        let _ = tx.send(event.clone());
    });
    assert!(client.remove_listener(id));

    client.connect(&url).await.expect("connect");
    wait_for_clients(&state, 1).await;
    state.broadcast_event("news:flash", "x").await.expect("valid kind");

    timeout(Duration::from_secs(2), rx.recv()).await.expect("kept listener fired");
    assert_eq!(removed_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn panicking_listener_does_not_stop_delivery() {
    let (url, state) = boot().await;
    let client = Client::new(config());
    client.on_event("news:flash", |_| panic!("listener bug"));
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    client.on_event("news:flash", move |event| {
        let _ = tx.send(event.clone());
    });

    client.connect(&url).await.expect("connect");
    wait_for_clients(&state, 1).await;
    state.broadcast_event("news:flash", "1").await.expect("valid kind");
    state.broadcast_event("news:flash", "2").await.expect("valid kind");

    for expected in ["1", "2"] {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("delivered")
            .expect("open");
        assert_eq!(event.payload, expected.as_bytes());
    }
    assert!(client.is_connected());
}

#[tokio::test]
async fn client_events_are_relayed_to_peers() {
    let (url, state) = boot().await;
    let alice = Client::new(config());
    let bob = Client::new(config());
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    bob.on_event("chat:msg", move |event| {
        let _ = tx.send(event.clone());
    });

    alice.connect(&url).await.expect("alice connects");
    bob.connect(&url).await.expect("bob connects");
    wait_for_clients(&state, 2).await;

    alice.send_event("chat:msg", "hi bob").await.expect("event sent");
    let event = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("relayed in time")
        .expect("open");
    assert_eq!(event.payload, b"hi bob");
    assert_eq!(alice.metrics().events_sent, 1);
    assert_eq!(alice.metrics().pending_count, 0);
}

// =============================================================================
// MISBEHAVING PEERS
// =============================================================================

#[tokio::test]
async fn text_message_is_a_fatal_protocol_violation() {
    let (code_tx, mut code_rx) = mpsc::unbounded_channel::<CloseCode>();
    let url = spawn_peer(move |_, mut ws| {
        let code_tx = code_tx.clone();
        async move {
            let _ = ws.send(Message::Text("not binary".into())).await;
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Close(Some(frame)) = msg {
                    let _ = code_tx.send(frame.code);
                }
            }
        }
    })
    .await;

    let recorder = Arc::new(Recorder::default());
    let client = Client::builder(config()).exception_handler(recorder.clone()).build();
    client.connect(&url).await.expect("connect");

    wait_until("failed state", || client.state() == ConnectionState::Failed).await;
    assert_eq!(client.metrics().protocol_errors, 1);

    let code = timeout(Duration::from_secs(2), code_rx.recv())
        .await
        .expect("close frame in time")
        .expect("open");
    assert_eq!(code, CloseCode::Protocol);
    wait_until("protocol error reported", || recorder.seen("E_PROTOCOL")).await;
}

#[tokio::test]
async fn undecodable_frame_fails_pending_requests() {
    let url = spawn_peer(|_, mut ws| async move {
        // Answer the first request with garbage.
        if let Some(Ok(Message::Binary(_))) = ws.next().await {
            let _ = ws.send(Message::Binary(b"garbage garbage garbage".to_vec().into())).await;
        }
        drain(ws).await;
    })
    .await;

    let client = Client::new(config());
    client.connect(&url).await.expect("connect");

    let err = client.send_async("c:ping", Vec::new()).await.expect_err("connection fails");
    assert!(matches!(err, ClientError::Closed(_)), "got {err:?}");
    wait_until("failed state", || client.state() == ConnectionState::Failed).await;
    assert_eq!(client.metrics().protocol_errors, 1);
}

#[tokio::test]
async fn lost_transport_reconnects_with_backoff() {
    let url = spawn_peer(|index, ws| async move {
        if index == 0 {
            drop(ws);
        } else {
            drain(ws).await;
        }
    })
    .await;

    let config = ClientConfig::builder()
        .heartbeat_interval(Duration::ZERO)
        .auto_reconnect(true)
        .min_backoff(Duration::from_millis(20))
        .max_backoff(Duration::from_millis(100))
        .reconnect_jitter(Duration::from_millis(10))
        .build()
        .expect("valid config");
    let client = Client::new(config);
    let transitions = record_transitions(&client);
    client.connect(&url).await.expect("connect");

    use ConnectionState::*;
    let expected = vec![
        (Closed, Connecting),
        (Connecting, Connected),
        (Connected, Failed),
        (Failed, Connecting),
        (Connecting, Connected),
    ];
    wait_until("reconnected", || snapshot(&transitions).len() >= expected.len()).await;
    assert_eq!(snapshot(&transitions), expected);
    assert_eq!(client.metrics().reconnect_attempts, 1);
    assert!(client.is_connected());

    client.close(Duration::from_secs(1)).await.expect("close");
}

#[tokio::test]
async fn close_cancels_scheduled_reconnect() {
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    let url = spawn_peer(move |_, ws| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { drop(ws) }
    })
    .await;

    let config = ClientConfig::builder()
        .heartbeat_interval(Duration::ZERO)
        .auto_reconnect(true)
        .min_backoff(Duration::from_millis(300))
        .max_backoff(Duration::from_millis(300))
        .reconnect_jitter(Duration::ZERO)
        .build()
        .expect("valid config");
    let client = Client::new(config);
    client.connect(&url).await.expect("connect");

    wait_until("transport lost", || client.state() == ConnectionState::Failed).await;
    client.close(Duration::from_secs(1)).await.expect("close");

    sleep(Duration::from_millis(500)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1, "no reconnect after close");
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.metrics().reconnect_attempts, 0);
}
