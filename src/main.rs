mod api;
mod config;
mod crypto;
mod db;
mod error;
mod logging;
mod metrics;
mod models;
mod registration;
#[cfg(test)]
mod testing;
mod zeropush;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

fn main() -> Result<()> {
    // Build custom runtime with explicit thread configuration
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async {
        // Load .env first so LOG_LEVEL and RUST_LOG from it take effect
        dotenv::dotenv().ok();

        logging::setup_logging();

        info!(worker_threads, "Starting push device registry");

        let config = config::Config::from_env()?;

        let db_pool = db::init_db_pool(&config.database_url, config.database_max_connections)
            .await
            .context("Failed to initialize database")?;

        let zeropush = zeropush::ZeroPushClient::new(
            &config.zeropush_api_url,
            config.zeropush_auth_token.clone(),
            config.zeropush_channel.clone(),
            config.zeropush_timeout,
        )
        .context("Failed to create ZeroPush client")?;
        info!("Push registrations go to {}", zeropush.register_url());

        let api_state = Arc::new(api::ApiState {
            store: db::PgDeviceStore::new(db_pool.clone()),
            registrar: zeropush,
        });
        let api_router = api::create_api_router(api_state, config.api_max_concurrency);

        info!("Starting API server on {}", config.api_bind_address);
        let listener = tokio::net::TcpListener::bind(&config.api_bind_address)
            .await
            .with_context(|| format!("Failed to bind {}", config.api_bind_address))?;

        axum::serve(listener, api_router)
            .with_graceful_shutdown(async {
                if let Err(e) = signal::ctrl_c().await {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Received shutdown signal, shutting down gracefully");
            })
            .await?;

        db_pool.close().await;
        info!("Shutdown complete");
        Ok(())
    })
}
