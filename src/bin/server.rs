//! Sporacle Web Server
//!
//! JSON API for the bet list dashboard.

use anyhow::{Context, Result};
use sporacle::api::{create_app, AppState};
use sporacle::{Config, SnapshotFetcher};
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Override with RUST_LOG env var, e.g. RUST_LOG=debug
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║       SPORACLE BET LISTS - WEB SERVER                        ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Odds database:  {:<43} ║", config.reference_db_path);
    println!("║  Local database: {:<43} ║", config.local_db_path);
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // First start: no snapshot yet
    if !Path::new(&config.reference_db_path).exists() {
        warn!("{} not found, downloading it", config.reference_db_path);
        SnapshotFetcher::new()?
            .fetch(&config.reference_db_url, &config.reference_db_path)
            .await
            .context("Initial download of the odds database failed")?;
    }

    info!("Initializing application state...");
    let state = AppState::new(config.clone()).await?;
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
