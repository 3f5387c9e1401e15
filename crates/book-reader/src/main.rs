//! Book Reader - serves e-books from the library through a local cache
//!
//! Book files fetched from the library are kept in a SQLite cache bounded by
//! a byte quota; least-recently-opened books are evicted first.

mod config;
mod error;
mod server;
mod types;

use crate::config::ReaderConfig;
use crate::error::{ReaderError, Result};
use crate::server::{start_server, ServerState, SharedState};
use book_cache::{BookCache, CacheDb, EvictionPolicy, StoreQuota};
use library_client::LibraryClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("book_reader=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Book Reader...");

    let config = ReaderConfig::from_env();
    info!("Port: {}", config.port);
    info!("Library URL: {}", config.library_url);
    info!("Cache database: {:?}", config.cache_db_path);
    info!("Cache quota: {} MB", config.quota_bytes / (1024 * 1024));

    let policy = EvictionPolicy::new(config.high_water_mark, config.low_water_mark)
        .map_err(|e| ReaderError::Config(e.to_string()))?;

    let db = CacheDb::open(&config.cache_db_path).await?;
    let oracle = Arc::new(StoreQuota::new(db.pool().clone(), config.quota_bytes));
    let cache = Arc::new(BookCache::with_policy(db, oracle, policy));

    let mut library = LibraryClient::with_timeout(
        &config.library_url,
        Duration::from_secs(config.library_timeout_secs),
    );
    if let Some(root) = &config.library_root {
        library = library.with_library_root(root);
    }

    let state: SharedState = Arc::new(ServerState::new(cache.clone(), library));

    // Start HTTP server (blocking)
    let served = start_server(state, config.port).await;
    cache.db().close().await;
    served?;

    Ok(())
}
