//! Router assembly and server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use smsfeed_store::MessageStore;

use crate::api;
use crate::config::ServerConfig;
use crate::feed::socket::SessionOptions;
use crate::feed::{Broadcaster, ConnectionRegistry};
use crate::history::HistoryRenderer;
use crate::ingest::IngestService;
use crate::shutdown::{DrainOutcome, ShutdownCoordinator};
use crate::sweeper::RetentionSweeper;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestService>,
    pub store: Arc<dyn MessageStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub renderer: Arc<HistoryRenderer>,
    pub session_options: SessionOptions,
    /// Parent of every viewer session's token.
    pub shutdown: CancellationToken,
    /// Upgraded viewer sessions, drained on shutdown.
    pub sessions: TaskTracker,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: &ServerConfig,
        store: Arc<dyn MessageStore>,
        coordinator: &ShutdownCoordinator,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), config.delivery_timeout));
        let renderer = Arc::new(HistoryRenderer::new(config.timezone, config.history_limit));
        let ingest = Arc::new(IngestService::new(
            store.clone(),
            broadcaster,
            renderer.clone(),
            config.api_key.clone(),
        ));
        Self {
            ingest,
            store,
            registry,
            renderer,
            session_options: config.session_options(),
            shutdown: coordinator.token(),
            sessions: coordinator.sessions(),
            start_time: Instant::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::history_page))
        .route("/api/sms", post(api::create_sms))
        .route("/ws", get(api::ws_handler))
        .route("/health", get(api::health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind, serve, and start the retention sweeper.
pub async fn start(
    config: ServerConfig,
    store: Arc<dyn MessageStore>,
) -> Result<ServerHandle, std::io::Error> {
    let coordinator = ShutdownCoordinator::new();
    let state = AppState::new(&config, store.clone(), &coordinator);
    let registry = state.registry.clone();
    let router = build_router(state);

    let listener = TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "smsfeed listening");

    let serve_token = coordinator.token();
    let http = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(serve_token.cancelled_owned())
            .await;
        if let Err(e) = result {
            error!(error = %e, "http server exited with error");
        }
    });

    let sweeper = RetentionSweeper::new(store, config.retention_ttl, config.sweep_interval)
        .spawn(coordinator.token());

    Ok(ServerHandle {
        local_addr,
        registry,
        coordinator,
        tasks: vec![http, sweeper.into_join_handle()],
    })
}

/// A running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    coordinator: ShutdownCoordinator,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Stop accepting, close viewers, stop the sweeper, and wait for all of
    /// them. Every viewer session has deregistered once this returns, unless
    /// the outcome reports `sessions_left`.
    pub async fn shutdown(self, timeout: Option<Duration>) -> DrainOutcome {
        info!(viewers = self.registry.len(), "shutting down");
        let outcome = self.coordinator.graceful_shutdown(self.tasks, timeout).await;
        info!(
            completed = outcome.completed,
            aborted = outcome.aborted,
            sessions_left = outcome.sessions_left,
            "shutdown complete"
        );
        outcome
    }
}
