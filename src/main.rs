use std::net::SocketAddr;
use std::sync::Arc;

use image_harvester::api::{self, AppState};
use image_harvester::external::HttpClient;
use image_harvester::services::{ChromeLauncher, HarvestConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = HarvestConfig::from_env()?;
    config.validate()?;

    // HTTP client is built once and shared by resolver, downloader and previews
    let http = HttpClient::new(config.http_config())?;
    let launcher = Arc::new(ChromeLauncher::new(config.user_agent.clone()));

    let addr: SocketAddr = config.bind_address().parse()?;
    let state = AppState::new(config, http, launcher)?;
    let preview_cache = state.previews.cache().clone();

    let app = api::router(state);

    tracing::info!("🚀 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 等待后台磁盘缓存写入完成
    preview_cache.wait_for_pending_writes().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
}
