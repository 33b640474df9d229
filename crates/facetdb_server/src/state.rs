//! Shared handler state.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use facetdb_core::{CoreResult, Engine};
use std::sync::Arc;

/// State handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The engine.
    pub engine: Arc<Engine>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Creates handler state around a shared engine.
    pub fn new(engine: Arc<Engine>, config: ServerConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }

    /// Runs an engine call on the blocking pool.
    ///
    /// Engine calls take locks and may touch the disk, so they stay off
    /// the async workers. The call runs to completion even if the client
    /// goes away.
    pub async fn run<T, F>(&self, call: F) -> ServerResult<T>
    where
        F: FnOnce(&Engine) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || call(&engine))
            .await
            .map_err(|e| ServerError::Internal(format!("engine task failed: {e}")))?
            .map_err(ServerError::from)
    }
}
