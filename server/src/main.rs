use server::{ServerConfig, ServerState, builtins};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();
    let state = ServerState::new(config, builtins::dispatcher());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(
        port = config.port,
        max_frame_size = config.max_frame_size,
        kinds = ?state.dispatcher.kinds(),
        "ecws server listening"
    );
    server::serve(listener, state).await
}
