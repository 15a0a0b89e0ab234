//! Paw Points Service - HTTP API for the points economy
//!
//! This is the main entry point for the paw-points service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paw_points_core::{CatalogProvider, StaticCatalog};
use paw_points_service::{create_router, spawn_purge_task, AppState, ServiceConfig};
use paw_points_store::{PgStore, Store};

/// How often idle rate-limit keys are dropped.
const RATE_LIMIT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,paw_points=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Paw Points Service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        postgres = %config.database_url.is_some(),
        admin_emails = config.admin_emails.len(),
        general_limit = config.rate_limits.general.max_requests,
        write_limit = config.rate_limits.write.max_requests,
        "Service configuration loaded"
    );

    let store = open_store(&config).await?;
    let catalog = load_catalog(&config).await?;

    let state = AppState::new(store, config.clone(), catalog);
    spawn_purge_task(Arc::clone(&state.rate_limiter), RATE_LIMIT_PURGE_INTERVAL);

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise `RocksDB` under `DATA_DIR`.
async fn open_store(
    config: &ServiceConfig,
) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    if let Some(url) = &config.database_url {
        tracing::info!(
            max_connections = config.database_max_connections,
            "Connecting to PostgreSQL"
        );
        let store = PgStore::connect(url, config.database_max_connections).await?;
        store.migrate().await?;
        return Ok(Arc::new(store));
    }

    #[cfg(feature = "rocksdb-backend")]
    {
        tracing::info!(path = %config.data_dir, "Opening RocksDB store");
        Ok(Arc::new(paw_points_store::RocksStore::open(&config.data_dir)?))
    }

    #[cfg(not(feature = "rocksdb-backend"))]
    {
        Err("DATABASE_URL is required when built without the rocksdb-backend feature".into())
    }
}

async fn load_catalog(
    config: &ServiceConfig,
) -> Result<Arc<dyn CatalogProvider>, Box<dyn std::error::Error>> {
    let catalog = match &config.catalog_path {
        Some(path) => {
            tracing::info!(path = %path, "Loading catalog");
            StaticCatalog::from_json(&tokio::fs::read_to_string(path).await?)?
        }
        None => StaticCatalog::default(),
    };

    tracing::info!(items = catalog.items().len(), "Catalog ready");

    Ok(Arc::new(catalog))
}
