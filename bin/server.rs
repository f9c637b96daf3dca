// OKR Tracker - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use tracing::info;

use okr_tracker::api::{router, AppState};
use okr_tracker::{config::AppConfig, logging, open_database};

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env();
    logging::init(&config.log_filter);

    println!("🌐 OKR Tracker - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Open (and migrate) database
    let conn = open_database(&config.db_path)?;
    info!(db = %config.db_path.display(), "database opened");
    println!("✓ Database opened: {:?}", config.db_path);

    let app = router(AppState::new(conn));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API: http://{}/api/dashboard", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
