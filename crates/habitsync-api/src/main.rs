mod auth;
mod config;
mod error;
mod rate_limit;
mod routes;
mod wire;

use std::sync::Arc;

use config::AppConfig;
use habitsync_core::SyncService;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("habitsync_api=info".parse()?)
                .add_directive("habitsync_core=info".parse()?),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting habitsync-api with config: {:?}", config);

    let sync = SyncService::open_path(&config.database_path).await?;
    let state = AppState::new(config, sync);
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("habitsync-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
