use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use telephony_bridge::{BridgeConfig, handlers, init, routes, state::AppState};

/// Telephony bridge - relays phone calls into LiveKit rooms
#[derive(Parser, Debug)]
#[command(name = "telephony-bridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download the Silero VAD model
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Must be installed before the LiveKit client opens any TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    if let Some(Commands::Init) = cli.command {
        init::run().await?;
        return Ok(());
    }

    let config = if let Some(config_path) = cli.config {
        println!("Loading configuration from {}", config_path.display());
        BridgeConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        BridgeConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let address = config.address();
    info!(
        livekit = %config.livekit.url,
        accept_incoming_calls = config.accept_incoming_calls,
        noise = config.noise.enabled,
        vad = config.vad.enabled,
        "Starting telephony bridge on {}", address
    );

    let app_state = AppState::new(config).map_err(|e| anyhow!(e.to_string()))?;

    let public_routes = Router::new().route("/", axum::routing::get(handlers::api::health_check));

    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    let app = public_routes
        .merge(routes::telephony::create_telephony_router())
        .with_state(app_state)
        .layer(security_headers);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    println!("Server listening on http://{}", socket_addr);

    let listener = TcpListener::bind(&socket_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
