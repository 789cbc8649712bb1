//! HTTP front end.
//!
//! ## Endpoints
//!
//! - `POST /api/chat/stream` — `{message, chat_id?}` → streamed `text/plain`
//! - `POST /api/tts` — `{text}` → `audio/mpeg`
//! - `POST /api/transcribe` — multipart `audio` → `{text, error?}`
//! - `GET /health` — `{status, sessions}`

pub mod error;
pub mod handlers;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::{NovaError, Result};
use crate::session::store::SessionStore;

pub use error::ApiError;
pub use state::AppState;

/// Largest accepted request body (audio uploads).
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/stream", post(handlers::chat_stream))
        .route("/api/tts", post(handlers::tts))
        .route("/api/transcribe", post(handlers::transcribe))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// A running gateway.
///
/// The server task (and the session sweeper, if any) is aborted on drop.
pub struct NovaServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    sweeper: Option<JoinHandle<()>>,
}

impl NovaServer {
    /// Bind `{config.host}:{config.port}` and serve in a background task.
    ///
    /// Port `0` picks a free port; see [`NovaServer::addr`].
    ///
    /// # Errors
    ///
    /// Returns [`NovaError::Server`] if the listener cannot bind.
    pub async fn start(state: AppState, config: &ServerConfig) -> Result<Self> {
        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| NovaError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| NovaError::Server(format!("failed to get local addr: {e}")))?;

        let sweeper = state
            .sweep_interval
            .filter(|every| !every.is_zero())
            .map(|every| spawn_sweeper(Arc::clone(&state.sessions), every));

        let app = router(state);
        info!("nova listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("server error: {e}");
            }
        });

        Ok(Self {
            addr,
            handle,
            sweeper,
        })
    }

    /// Address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
        if let Some(sweeper) = &self.sweeper {
            sweeper.abort();
        }
    }
}

impl Drop for NovaServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_sweeper(sessions: Arc<dyn SessionStore>, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_expired().await;
            if evicted > 0 {
                debug!("session sweep evicted {evicted}");
            }
        }
    })
}
