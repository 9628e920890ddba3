use anyhow::{Context, Result};
use catalog_service::config::{Config, LoggingConfig};
use catalog_service::{
    grpc_server, CatalogService, DiskImageStore, InMemoryLaptopStore, InMemoryRatingStore,
};
use std::sync::Arc;
use tokio::signal;
use tonic::transport::Server;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;

    init_tracing(&config.logging);

    info!(
        service = "catalog-service",
        version = env!("CARGO_PKG_VERSION"),
        "Starting laptop catalog service"
    );

    config.validate()?;

    if config.metrics.enabled {
        init_metrics(config.metrics.port)?;
    }

    tokio::fs::create_dir_all(&config.image_store.directory)
        .await
        .with_context(|| {
            format!(
                "Failed to create image directory {}",
                config.image_store.directory.display()
            )
        })?;

    let service = Arc::new(CatalogService::new(
        Arc::new(InMemoryLaptopStore::new()),
        Arc::new(DiskImageStore::new(config.image_store.directory.clone())),
        Arc::new(InMemoryRatingStore::new()),
    ));

    let addr = config.server.listen_addr()?;
    info!(%addr, "gRPC server listening");

    Server::builder()
        .timeout(config.server.request_timeout())
        .concurrency_limit_per_connection(config.server.concurrency_limit_per_connection)
        .add_service(grpc_server(service, config.server.request_timeout()))
        .serve_with_shutdown(addr, shutdown_signal())
        .await
        .context("gRPC server error")?;

    info!("Catalog service stopped");

    Ok(())
}

/// Load configuration from files, falling back to environment only.
fn load_config() -> Result<Config> {
    let config = Config::load().or_else(|e| {
        warn!(error = %e, "Failed to load config from files, trying environment");
        Config::from_env()
    })?;

    Ok(config)
}

/// Initialize tracing/logging
fn init_tracing(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.format == "pretty" {
        subscriber.with(fmt::layer().pretty()).init();
    } else {
        subscriber.with(fmt::layer().json()).init();
    }
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
