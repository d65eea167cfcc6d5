//! bookshelf - book catalogue RPC server
//!
//! Serves add/get/update/delete/list operations over a single book
//! collection keyed by isbn.

use bookshelf_core::sample_books;
use bookshelf_server::{BookService, Config, Server, StorageBackend};
use bookshelf_storage::{BookCollection, MemoryCollection, MongoCollection};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Missing or malformed settings stop the process before anything binds.
    let config = match Config::load().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    let server_config = config.server_config()?;

    tracing::info!("Starting bookshelf server");
    tracing::info!("  Bind address: {}", server_config.bind_addr);

    let collection: Arc<dyn BookCollection> = match config.database.backend {
        StorageBackend::Mongo => {
            let mongo_config = config.database.mongo_config()?;
            match MongoCollection::connect(&mongo_config).await {
                Ok(collection) => Arc::new(collection),
                Err(e) => {
                    tracing::error!("Failed to connect to database: {}", e);
                    return Err(e.into());
                }
            }
        }
        StorageBackend::Memory => Arc::new(MemoryCollection::new()),
    };
    tracing::info!("  Collection: {}", collection.describe());

    let service = Arc::new(BookService::new(collection.clone()));
    if config.seed.enabled {
        service.seed(&sample_books()).await?;
    }

    let server = Arc::new(Server::new(server_config, service));

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Blocks until shutdown
    let result = server.run().await;
    collection.close().await;

    tracing::info!(
        "Server stopped ({} connections, {} requests served)",
        server.stats().connections_total.load(Ordering::Relaxed),
        server.stats().requests_total.load(Ordering::Relaxed)
    );
    result.map_err(Into::into)
}
