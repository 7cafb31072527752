// File: pos-sync-server/src/main.rs
// Purpose: Binary entry point for the reference sync endpoint

use anyhow::Context;
use pos_sync_server::{router, AppState, DEFAULT_ADDR};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt::init();

    let addr = std::env::var("POS_SYNC_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("pos-sync-server listening on http://{}", addr);
    info!("  POST /api/sync");
    info!("  GET  /api/sync/changes");
    info!("  GET  /api/health");

    axum::serve(listener, router(AppState::new()))
        .await
        .context("Server error")?;

    Ok(())
}
