mod api;
mod auth;
mod bootstrap;
mod catalog;
mod config;
mod error;
mod gateway;
mod ledger;
mod middleware;
mod notify;
mod rate_limit;
mod server;
mod settlement;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenv::dotenv().ok();

    // Initialize tracing
    init_tracing();

    info!("🚀 Starting payment verification & settlement service");

    let cfg = AppConfig::from_env()?;

    let state = bootstrap::initialize_app_state(&cfg).await?;

    // Create HTTP server
    let app = server::create_app(state, &cfg.cors_origins());

    // Run the Server
    server::run_server(app, &cfg.bind_address).await?;

    Ok(())
}
