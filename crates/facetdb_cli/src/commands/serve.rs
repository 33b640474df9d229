//! Serve command implementation.

use crate::config::AppConfig;
use crate::error::CliResult;
use facetdb_core::Engine;
use facetdb_server::FacetServer;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs the serve command until Ctrl-C.
pub fn run(path: &Path, bind: Option<SocketAddr>, data_dir: Option<PathBuf>) -> CliResult<()> {
    let mut config = AppConfig::load(path)?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(dir) = data_dir {
        config.storage.data_dir = Some(dir);
    }
    config.validate()?;

    match &config.storage.data_dir {
        Some(dir) => info!(data_dir = %dir.display(), "opening engine"),
        None => warn!("no data directory configured, documents live in memory only"),
    }
    let engine = Arc::new(Engine::open(config.engine_config(), config.entities.clone())?);
    let server = FacetServer::new(engine, config.server_config());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server.serve(shutdown_signal()))?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => warn!(error = %e, "cannot listen for Ctrl-C, shutting down"),
    }
}
