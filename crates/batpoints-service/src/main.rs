//! BAT Points service entry point.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use batpoints_service::{create_router, AppState, ServiceConfig};
use batpoints_store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,batpoints=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting BAT Points service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        chain_configured = config.chain.is_configured(),
        notifications_configured = config.notification_url.is_some(),
        jwt_configured = config.jwt_secret.is_some(),
        "Service configuration loaded"
    );

    let store = open_store(&config)?;
    let state = AppState::new(store, config.clone())?;

    // Finalize anything a previous run left in flight, then keep sweeping.
    Arc::clone(&state.recovery).spawn(Duration::from_secs(config.recovery_interval_seconds));

    let app = create_router(state);

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(feature = "rocksdb-backend")]
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    Ok(Arc::new(batpoints_store::RocksStore::open(&config.data_dir)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    if !config.allow_memory_store {
        return Err("built without rocksdb-backend; set ALLOW_IN_MEMORY_LEDGER=true to run \
                    on the in-memory ledger"
            .into());
    }
    tracing::warn!("Built without rocksdb-backend - ledger is held in memory only");
    Ok(Arc::new(batpoints_store::MemoryStore::new()))
}
