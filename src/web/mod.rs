//! Web server module.

mod handlers;

pub use handlers::*;

use crate::check::Checker;
use crate::config::ServerConfig;
use crate::db::Store;

use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub checker: Arc<Checker>,
}

/// Management API server.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>, checker: Arc<Checker>) -> Self {
        Self {
            config,
            state: AppState { store, checker },
        }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/health", get(handlers::handle_health))
            // Nodes
            .route(
                "/api/nodes",
                get(handlers::handle_get_nodes).post(handlers::handle_create_node),
            )
            .route(
                "/api/nodes/{id}",
                get(handlers::handle_get_node)
                    .put(handlers::handle_update_node)
                    .delete(handlers::handle_delete_node),
            )
            .route("/api/nodes/{id}/logs", get(handlers::handle_get_node_logs))
            .route(
                "/api/nodes/with-logs/all",
                get(handlers::handle_get_nodes_with_logs),
            )
            // Probe logs and latest statuses are read-only
            .route("/api/node-logs", get(handlers::handle_get_probe_logs))
            .route("/api/node-logs/{id}", get(handlers::handle_get_probe_log))
            .route("/api/histories", get(handlers::handle_get_histories))
            .route("/api/histories/{id}", get(handlers::handle_get_history))
            // Manual trigger
            .route(
                "/api/check-uptime",
                get(handlers::handle_check_uptime).post(handlers::handle_check_uptime),
            )
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port and serve until `shutdown`
    /// resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
