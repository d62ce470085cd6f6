mod api;
mod bot;
mod config;
mod twilio;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use bot::{Bot, LoopbackBot};
use config::Config;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Takes over each media stream once the handshake completes.
    pub bot: Arc<dyn Bot>,
    /// Cancelled on Ctrl-C; bot sessions get child tokens.
    pub shutdown: CancellationToken,
}

/// What the command line asked for.
#[derive(Debug, PartialEq)]
enum Command {
    Serve { testing: bool },
    Version,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let rest = args.get(1..).unwrap_or_default();
    match rest {
        [] => Ok(Command::Serve { testing: false }),
        [flag] => match flag.as_str() {
            "--test" => Ok(Command::Serve { testing: true }),
            "--version" => Ok(Command::Version),
            "--help" | "-h" => Ok(Command::Help),
            other => Err(other.to_string()),
        },
        [_, extra, ..] => Err(extra.to_string()),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match parse_args(&args) {
        Ok(Command::Serve { testing }) => {
            let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
            rt.block_on(server(testing));
        }
        Ok(Command::Version) => println!("call-relay {VERSION}"),
        Ok(Command::Help) => print_usage(),
        Err(other) => {
            eprintln!("Unknown option: {other}");
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!("call-relay {VERSION}");
    println!("Relay between Twilio calls and a bot runtime");
    println!();
    println!("Usage: call-relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --test      Start in testing mode (loopback bot echoes caller audio)");
    println!("  --version   Print version");
    println!("  --help, -h  Print this help message");
    println!();
    println!("Without options, starts the relay server.");
}

async fn server(testing: bool) {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_relay=info,tower_http=info".into()),
        )
        .init();

    // Load config
    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };
    if testing {
        config.bot.testing = true;
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        testing = config.bot.testing,
        template = %config.twiml.template_path.display(),
        "Starting call-relay"
    );
    if config.twilio.credentials().is_none() {
        tracing::warn!("Twilio credentials not configured; /outbound and /call-status will fail");
    }

    let addr: SocketAddr = match format!("{}:{}", config.server.host, config.server.port).parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Invalid server address: {e}");
            std::process::exit(1);
        }
    };

    let state = AppState {
        config: Arc::new(config),
        bot: Arc::new(LoopbackBot),
        shutdown: CancellationToken::new(),
    };
    let shutdown = state.shutdown.clone();
    let app = router(state);

    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("Server error");
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Twilio webhooks
        .route("/", post(twilio::webhook::handle_incoming))
        .route(
            "/outbound-twiml",
            post(twilio::webhook::handle_outbound_twiml),
        )
        // Outbound calls and status lookups
        .route("/outbound", get(api::outbound::handle_outbound))
        .route(
            "/call-status/{call_sid}",
            get(api::status::handle_call_status),
        )
        // Twilio media stream (WebSocket)
        .route("/ws", get(twilio::media::handle_media_upgrade))
        // Health check
        .route("/health", get(health))
        // Any origin, method and header; credentials allowed (origin is mirrored)
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl-C handler: {e}");
        return std::future::pending().await;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
pub(crate) fn test_state(config: Config) -> AppState {
    AppState {
        config: Arc::new(config),
        bot: Arc::new(LoopbackBot),
        shutdown: CancellationToken::new(),
    }
}

#[cfg(test)]
pub(crate) async fn spawn_test_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
