//! Router and server loop.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use facetdb_core::Engine;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Builds the API router.
///
/// Static segments win over parameters, so `/team/schema` never reaches
/// the `/{entity}/{id}/...` routes.
pub fn router(state: AppState) -> Router {
    let limit = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(handler::health))
        .route("/attachments/:entity/:file", get(handler::download))
        .route(
            "/:entity/collection",
            get(handler::list_documents).post(handler::create_document),
        )
        .route(
            "/:entity/collection/:id",
            get(handler::get_document)
                .put(handler::replace_document)
                .delete(handler::delete_document),
        )
        .route("/:entity/collection/:id/picture", post(handler::attach))
        .route("/:entity/schema", get(handler::schema))
        .route("/:entity/settings", get(handler::settings))
        .route("/:entity/pane.json", get(handler::pane))
        .route("/:entity/ufacets", get(handler::unique_facets))
        .route("/:entity/facets", get(handler::facets))
        .route(
            "/:entity/property/:field/:value",
            get(handler::find_by_property),
        )
        .route(
            "/:entity/:id/property/:field/:value",
            put(handler::patch_property).delete(handler::delete_property),
        )
        .route("/:entity/picture", post(handler::upload))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The HTTP server.
///
/// # Example
///
/// ```no_run
/// use facetdb_core::{Engine, EntityDef, FieldDef, FieldKind};
/// use facetdb_server::{FacetServer, ServerConfig};
/// use std::sync::Arc;
///
/// # async fn run() -> facetdb_server::ServerResult<()> {
/// let team = EntityDef::new("team", "Our team", "member")
///     .field(FieldDef::new("name", FieldKind::String));
/// let engine = Arc::new(Engine::open_in_memory([team])?);
///
/// let server = FacetServer::new(engine, ServerConfig::default());
/// server.serve(async { let _ = tokio::signal::ctrl_c().await; }).await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FacetServer {
    state: AppState,
}

impl FacetServer {
    /// Creates a server around a shared engine.
    pub fn new(engine: Arc<Engine>, config: ServerConfig) -> Self {
        Self {
            state: AppState::new(engine, config),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Returns the router, for embedding or in-process testing.
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.state.config.bind_addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %listener.local_addr()?, "listening");
        let sweeper = spawn_sweeper(
            Arc::clone(&self.state.engine),
            self.state.config.sweep_interval,
        );

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;
        sweeper.abort();
        info!("server stopped");
        Ok(result?)
    }
}

/// Runs the attachment sweep every `interval` until aborted.
pub fn spawn_sweeper(engine: Arc<Engine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let engine = Arc::clone(&engine);
            if let Err(e) =
                tokio::task::spawn_blocking(move || engine.sweep_attachments(Instant::now())).await
            {
                warn!(error = %e, "attachment sweep task failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetdb_core::{EntityDef, FieldDef, FieldKind};

    fn engine() -> Arc<Engine> {
        let team = EntityDef::new("team", "Our team", "member")
            .field(FieldDef::new("name", FieldKind::String));
        Arc::new(Engine::open_in_memory([team]).unwrap())
    }

    #[tokio::test]
    async fn serves_until_shutdown() {
        let server = FacetServer::new(engine(), ServerConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(server.serve_on(listener, async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn sweeper_stops_on_abort() {
        let sweeper = spawn_sweeper(engine(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        sweeper.abort();
        assert!(sweeper.await.unwrap_err().is_cancelled());
    }
}
