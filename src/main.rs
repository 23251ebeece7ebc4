//! KeyQuest Game Server - Authoritative cooperative platformer server
//!
//! This is the main entry point for the game server. It handles:
//! - WebSocket connections for rooms and real-time gameplay
//! - The per-room authoritative simulation loop
//! - Health and liveness endpoints

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use keyquest_server::app::AppState;
use keyquest_server::config::Config;
use keyquest_server::http::build_router;
use keyquest_server::util::logging;
use keyquest_server::util::signal::shutdown_requested;
use keyquest_server::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    logging::init(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting KeyQuest Game Server");
    info!("Server address: {}", config.server_addr);
    info!("Tick rate: {} Hz", config.tick_rate);

    // Create application state
    let state = AppState::new(config.clone());

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_requested())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
