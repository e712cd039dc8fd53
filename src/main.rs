use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use market_intel::api;
use market_intel::config::AppConfig;
use market_intel::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config)?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("market-intel listening on {}", bind_addr);
    axum::serve(listener, api::router(state)).await?;
    Ok(())
}
