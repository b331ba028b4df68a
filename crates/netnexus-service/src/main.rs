//! Net Nexus Service - Wi-Fi and Bluetooth portal HTTP API.
//!
//! Run with: `cargo run -p netnexus-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use netnexus_core::{BtleRadio, ConnectionCoordinator, NmcliBackend, get_adapter};
use netnexus_service::{AppState, Config, api};
use netnexus_store::JsonFileStore;

/// Net Nexus Service - Wi-Fi and Bluetooth connectivity portal.
#[derive(Parser, Debug)]
#[command(name = "netnexus-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override bind address (e.g., "127.0.0.1:3000").
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the saved-devices file path.
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Serve the portal front end from this directory.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// nmcli executable used for Wi-Fi.
    #[arg(long, default_value = "nmcli")]
    nmcli: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("netnexus_service=info".parse()?)
                .add_directive("netnexus_core=info".parse()?)
                .add_directive("netnexus_store=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    // Override config with CLI args
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(path) = args.store {
        config.storage.path = path;
    }
    if let Some(dir) = args.static_dir {
        config.server.static_dir = Some(dir);
    }
    config.validate()?;

    // Saved devices
    let store_path = config.storage.resolved_path();
    info!("Using device store at {}", store_path.display());
    let store = JsonFileStore::open(&store_path);
    if let Err(e) = store.ensure_exists() {
        warn!("Could not create {}: {}", store_path.display(), e);
    }

    // Radios
    let adapter = get_adapter().await?;
    let radio = BtleRadio::with_adapter(adapter, config.bluetooth.connection_config()).await?;
    let coordinator = ConnectionCoordinator::new(
        Arc::new(radio),
        Arc::new(store),
        config.bluetooth.coordinator_config(),
    );
    let wifi = NmcliBackend::with_program(args.nmcli);

    let state = AppState::new(Arc::new(coordinator), Arc::new(wifi), config.clone());

    // Build the router
    let mut app = Router::new().merge(api::router());
    if let Some(dir) = &config.server.static_dir {
        info!("Serving static files from {}", dir.display());
        app = app.fallback_service(ServeDir::new(dir));
    }
    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Net Nexus portal running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
