//! `SyncServer` — axum HTTP server for the sync core.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::routing::{get, post};
use beacon_store::SyncStore;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::routes::{self, AppState};
use crate::shutdown::ShutdownCoordinator;
use crate::sse::SseRegistry;

/// The Beacon sync server.
pub struct SyncServer {
    config: ServerConfig,
    store: Arc<SyncStore>,
    sse: Arc<SseRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl SyncServer {
    /// Create a new server around an existing store.
    #[must_use]
    pub fn new(config: ServerConfig, store: Arc<SyncStore>) -> Self {
        let sse = Arc::new(SseRegistry::new(config.sse_buffer));
        Self {
            config,
            store,
            sse,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the axum router with all routes and middleware.
    ///
    /// CORS is wide open on purpose: the dashboard is opened from `file://`
    /// (origin `null`) as often as from a host.
    pub fn router(&self) -> Router {
        let state = AppState {
            store: self.store.clone(),
            sse: self.sse.clone(),
            agent_status: Arc::new(RwLock::new(AppState::initial_agent_status())),
            api_key: Arc::from(self.config.api_key.as_str()),
            start_time: self.start_time,
            keep_alive: Duration::from_millis(self.config.keep_alive_interval_ms),
        };

        Router::new()
            .route("/health", get(routes::health))
            .route("/api/poll", get(routes::poll))
            .route("/api/state", get(routes::state_snapshot))
            .route(
                "/api/cc-state",
                get(routes::cc_state).post(routes::cc_state_save),
            )
            .route("/api/push", post(routes::push))
            .route("/api/batch", post(routes::batch))
            .route("/api/events", get(routes::events))
            .route(
                "/api/agent-status",
                get(routes::agent_status).post(routes::agent_status_save),
            )
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(RequestBodyLimitLayer::new(self.config.max_body_bytes))
            .with_state(state)
    }

    /// Bind and serve until the shutdown token cancels.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(%error, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// The store behind this server.
    #[must_use]
    pub fn store(&self) -> &Arc<SyncStore> {
        &self.store
    }

    /// The fanout registry.
    #[must_use]
    pub fn sse(&self) -> &Arc<SseRegistry> {
        &self.sse
    }

    /// The shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
