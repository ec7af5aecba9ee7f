//! `evrys serve`.

use std::net::SocketAddr;
use std::time::Duration;

use evrys_notify::open_bus;
use evrys_server::config::load_config;
use evrys_server::{IngestService, ServeError, ServiceConfig};
use evrys_store::open_store;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::CommandError;
use crate::signal::cancel_on_shutdown;

pub struct Args {
    pub config: String,
    pub addr: Option<SocketAddr>,
    pub log_level: Option<String>,
    pub log_json: bool,
}

pub async fn run(args: Args) -> Result<(), CommandError> {
    let config = load_config(Some(&args.config))?;

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    crate::init_tracing(level, args.log_json || config.logging.json);
    match &config.missing_file {
        Some(path) => tracing::info!(path = %path, "config file not found, using defaults"),
        None => tracing::info!(path = %args.config, "loaded configuration"),
    }

    let store = open_store(
        &config.store,
        tracing::info_span!("store", kind = ?config.store.kind),
    )
    .await?;
    let bus = open_bus(&config.bus, tracing::info_span!("bus", kind = ?config.bus.kind))?;

    let addr = args
        .addr
        .unwrap_or_else(|| SocketAddr::new(config.server.host, config.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("failed to bind {addr}: {e}"))?;
    tracing::info!(%addr, "starting evrys ingestion service");

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(shutdown.clone()));

    let service = IngestService::new(ServiceConfig {
        store: Some(store.append),
        query: store.query,
        bus,
        notify_timeout: Duration::from_millis(config.server.notify_timeout_ms),
        span: tracing::info_span!("ingest"),
    });

    match service.serve(Some(listener), shutdown).await {
        Err(ServeError::Stopped) => Ok(()),
        Err(e) => Err(e.into()),
        Ok(never) => match never {},
    }
}
