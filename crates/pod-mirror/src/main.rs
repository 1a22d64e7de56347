//! Pod Mirror - client-side mirror of the pod backend
//!
//! Loads the pod snapshot, applies the backend's push events and serves the
//! mirrored state, health and metrics over HTTP.

use anyhow::Result;
use pod_mirror::{api, config::MirrorConfig, feed};
use podsync_lib::{Backend, LocalBackend, PodSync, StructuredLogger};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MIRROR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting pod-mirror");

    let config = MirrorConfig::load()?;
    info!(
        instance = %config.instance,
        api_port = config.api_port,
        flush_interval_ms = config.flush_interval_ms,
        "Mirror configured"
    );

    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(MIRROR_VERSION);

    let backend = Arc::new(LocalBackend::new());
    if let Some(path) = &config.seed_path {
        let pods = feed::load_seed(path).await?;
        info!(pods = pods.len(), "Seeding backend");
        backend.inject_pods(pods).await?;
    }

    let mut sync = PodSync::builder()
        .local(backend.clone())
        .config(config.sync_config())
        .instance(config.instance.clone())
        .build()
        .await?;

    // Subscribe before loading so no event between the two is lost
    sync.listen().await?;
    if let Err(e) = sync.load_pods().await {
        warn!(error = %e, "Initial pod load failed, serving empty snapshot");
    }

    let feed_backend = backend.clone();
    let feed_path = config.feed_path.clone();
    let feed_handle = tokio::spawn(async move {
        if let Err(e) = feed::run(feed_path.as_deref(), feed_backend).await {
            error!(error = %e, "Event feed failed");
        }
    });

    let app_state = Arc::new(api::AppState::new(sync.watch(), sync.health().clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
                Ok(Ok(())) => {}
            }
            logger.log_shutdown("API server stopped");
        }
    }

    feed_handle.abort();
    sync.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}
