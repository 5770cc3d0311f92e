use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use ecws::{Client, ClientConfig, ClientError, ConfigError, Event, Response};
use serde_json::{Value, json};
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid client configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Client(#[from] ClientError),
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event stream ended")]
    StreamEnded,
}

#[derive(Parser, Debug)]
#[command(name = "ecws-cli", about = "ECWS/1 command-line client")]
struct Cli {
    #[arg(long, env = "ECWS_URL", default_value = "ws://127.0.0.1:3000/ws")]
    url: String,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = "ECWS_CLI_TIMEOUT_MS", default_value_t = 5000)]
    timeout_ms: u64,

    /// Print connection metrics as JSON before exiting.
    #[arg(long, default_value_t = false)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Round-trip `sys:ping` and report the RTT.
    Ping {
        #[arg(default_value = "ping")]
        payload: String,
    },
    /// Send one request and print the response.
    Send {
        kind: String,
        #[arg(default_value = "")]
        payload: String,
    },
    /// Send one fire-and-forget event.
    Emit {
        kind: String,
        #[arg(default_value = "")]
        payload: String,
    },
    /// Print incoming events as JSON lines until interrupted.
    Listen {
        #[arg(long)]
        kind: Option<String>,
        /// Exit after this many events.
        #[arg(long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let timeout = Duration::from_millis(cli.timeout_ms);
    let client = Client::new(ClientConfig::from_env()?);
    client.connect(&cli.url).await?;

    let result = match cli.command {
        Command::Ping { payload } => run_ping(&client, payload, timeout).await,
        Command::Send { kind, payload } => run_send(&client, &kind, payload, timeout).await,
        Command::Emit { kind, payload } => run_emit(&client, &kind, payload).await,
        Command::Listen { kind, count } => run_listen(&client, kind.as_deref(), count).await,
    };

    if cli.metrics {
        print_json(&serde_json::to_value(client.metrics())?)?;
    }
    let _ = client.close(timeout).await;
    result
}

async fn run_ping(client: &Client, payload: String, timeout: Duration) -> Result<(), CliError> {
    let started = Instant::now();
    let response = client
        .send_with_timeout("sys:ping", payload.into_bytes(), timeout)
        .await?;
    let rtt = started.elapsed();
    let mut rendered = response_json(&response);
    rendered["rtt_ms"] = json!(rtt.as_secs_f64() * 1000.0);
    print_json(&rendered)
}

async fn run_send(client: &Client, kind: &str, payload: String, timeout: Duration) -> Result<(), CliError> {
    let response = client
        .send_with_timeout(kind, payload.into_bytes(), timeout)
        .await?;
    print_json(&response_json(&response))
}

async fn run_emit(client: &Client, kind: &str, payload: String) -> Result<(), CliError> {
    client.send_event(kind, payload.into_bytes()).await?;
    print_json(&json!({ "emitted": kind }))
}

async fn run_listen(client: &Client, kind: Option<&str>, count: Option<usize>) -> Result<(), CliError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let forward = move |event: &Event| {
        let _ = tx.send(event.clone());
    };
    match kind {
        Some(kind) => client.on_event(kind, forward),
        None => client.on_any_event(forward),
    };

    let mut seen = 0usize;
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    return Err(CliError::StreamEnded);
                };
                print_json_line(&json!({
                    "kind": event.kind,
                    "payload": String::from_utf8_lossy(&event.payload),
                }))?;
                seen += 1;
                if count.is_some_and(|limit| seen >= limit) {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

fn response_json(response: &Response) -> Value {
    json!({
        "request_id": response.request_id,
        "kind": response.kind,
        "status": response.status,
        "payload": response.text(),
    })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

fn print_json_line(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string(value)?;
    println!("{rendered}");
    Ok(())
}
