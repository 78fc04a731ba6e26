use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use chess_companion_core::{lock, AnalysisConfig, AnalysisOrchestrator};

mod routes;

#[derive(Parser)]
#[command(name = "chess-companion")]
#[command(about = "Play chess with a UCI engine's best move and evaluation alongside")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "companion.toml")]
    config: PathBuf,
    /// Engine binary, overrides the configuration file
    #[arg(short, long)]
    engine: Option<String>,
    /// Search depth, overrides the configuration file
    #[arg(short, long)]
    depth: Option<u32>,
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
}

pub struct AppState {
    pub orchestrator: Mutex<AnalysisOrchestrator>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(routes::state))
        .route("/move", post(routes::make_move))
        .route("/reset", post(routes::reset))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = AnalysisConfig::load(&cli.config)?;
    if let Some(engine) = cli.engine {
        config.engine.path = engine;
    }
    if let Some(depth) = cli.depth {
        config.depth = depth;
    }

    let mut orchestrator = AnalysisOrchestrator::from_config(&config);
    if let Err(e) = orchestrator.start() {
        tracing::warn!("Continuing without engine analysis: {}", e);
    }

    let state = Arc::new(AppState {
        orchestrator: Mutex::new(orchestrator),
    });

    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    tracing::info!("Server running at http://{}", cli.bind);

    axum::serve(listener, app(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    lock(&state.orchestrator).shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
