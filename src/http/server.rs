//! Router construction and process lifecycle for the bastion HTTP surface.
//!
//! Grounded on the teacher's `ProxyServer`/`AppState` (`src/proxy/server.rs`):
//! same `Arc`-based shared-state shape, same `ServiceBuilder` layer stack,
//! same graceful-shutdown-over-a-broadcast-channel pattern. Trimmed to the
//! layers this surface actually needs (no CORS, no compression — this is an
//! intra-fleet control API, not a public edge).

use crate::cloud::CloudClient;
use crate::config::ConfigStore;
use crate::error::Result;
use crate::http::handlers;
use crate::registry::AliasRegistry;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AliasRegistry>,
    pub cloud: Arc<dyn CloudClient>,
    pub config_store: Arc<ConfigStore>,
}

pub struct BastionServer {
    state: AppState,
    listen_addr: SocketAddr,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl BastionServer {
    pub fn new(
        listen_addr: SocketAddr,
        registry: AliasRegistry,
        cloud: Arc<dyn CloudClient>,
        config_store: ConfigStore,
    ) -> Self {
        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
        Self {
            state: AppState {
                registry: Arc::new(registry),
                cloud,
                config_store: Arc::new(config_store),
            },
            listen_addr,
            shutdown_tx,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    fn build_router(&self) -> Router {
        Router::new()
            .route("/autoscaling", get(handlers::list_groups))
            .route("/autoscaling/resolve/:alias", get(handlers::resolve_alias))
            .route("/autoscaling/health/:alias", get(handlers::health))
            .route("/autoscaling/refresh", post(handlers::refresh))
            .route("/autoscaling/delete", post(handlers::delete_group))
            .route("/autoscaling/instance/register", post(handlers::register_instance))
            .route("/autoscaling/instance/deregister", post(handlers::deregister_instance))
            .route("/autoscaling/config/update", post(handlers::update_config))
            .route("/status/autoscaling", get(handlers::status))
            .layer(
                ServiceBuilder::new()
                    .layer(tower::timeout::TimeoutLayer::new(Duration::from_secs(30)))
                    .layer(TraceLayer::new_for_http()),
            )
            .with_state(self.state.clone())
    }

    /// Bind and serve until a shutdown signal arrives on `shutdown_rx`.
    pub async fn run(self, mut shutdown_rx: tokio::sync::broadcast::Receiver<()>) -> Result<()> {
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.listen_addr).await?;
        info!(addr = %self.listen_addr, "bastion listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("bastion shutting down gracefully");
            })
            .await?;

        info!("bastion stopped");
        Ok(())
    }

    pub fn shutdown_handle(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }
}
