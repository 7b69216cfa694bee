use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use cachesquid::{cache::Cache, config::Config, engine, logger::RequestLogger, pool::WorkerPool};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cachesquid=info".parse()?),
        )
        .init();

    let config = Config::default();

    info!("cachesquid v{} - caching forward proxy", env!("CARGO_PKG_VERSION"));
    info!("Listening on port {}", config.listen_port);
    info!("Cache capacity: {} entries", config.cache_capacity);
    info!("Worker pool size: {}", config.num_workers);

    let logger = Arc::new(RequestLogger::open(&config.log_path).await.map_err(|e| {
        error!("fatal: failed to open request log: {e}");
        e
    })?);
    let cache = Arc::new(Cache::with_capacity(config.cache_capacity));
    let pool = Arc::new(WorkerPool::with_workers(config.num_workers));

    let listener = TcpListener::bind(("0.0.0.0", config.listen_port)).await?;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((client, addr)) => {
                        debug!("Accepted connection from {addr}");
                        let cache = cache.clone();
                        let logger = logger.clone();
                        let peer_ip = addr.ip().to_string();
                        let enqueued = pool
                            .enqueue(async move {
                                engine::handle_connection(client, peer_ip, cache, logger).await;
                            })
                            .await;
                        if enqueued.is_err() {
                            warn!("worker pool queue closed, dropping connection from {addr}");
                        }
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {e}");
                    }
                }
            }
        }
    }

    info!("shutting down worker pool");
    if let Ok(pool) = Arc::try_unwrap(pool) {
        pool.shutdown().await;
    }
    info!("shutdown complete");

    Ok(())
}
