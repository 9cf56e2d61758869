use clap::Parser;
use pitwall_server::auth::{AllowAll, StaticToken, TokenVerifier};
use pitwall_server::handler::ConnectionHandler;
use pitwall_server::listener::create_session_route;
use pitwall_server::memory_storage::MemoryStorage;
use pitwall_server::observability::LogConfig;
use pitwall_server::store::MemoryTelemetryStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "pitwall-server")]
#[command(version, about = "Realtime racing telemetry distribution server")]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: tracing::Level,

    /// Require this token on every connection; omit to accept all
    #[arg(short, long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = LogConfig::default().with_level(cli.log_level).init() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let storage = Arc::new(MemoryStorage::new());
    let telemetry = Arc::new(MemoryTelemetryStore::new());
    let handler = ConnectionHandler::new(storage.clone(), storage, telemetry);

    let verifier: Arc<dyn TokenVerifier> = match cli.token {
        Some(token) => Arc::new(StaticToken::new(token)),
        None => Arc::new(AllowAll),
    };

    let app = create_session_route(handler, verifier);
    let listener = match tokio::net::TcpListener::bind(cli.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind {}: {e}", cli.addr);
            std::process::exit(1);
        }
    };

    info!("listening on ws://{}/session", cli.addr);
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}
