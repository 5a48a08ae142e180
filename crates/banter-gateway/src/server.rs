//! HTTP server wrapping the WebSocket gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::session::ws_handler;
use crate::state::GatewayState;

/// The gateway's HTTP surface: `/ws` upgrade and `/health`.
pub struct GatewayServer {
    state: Arc<GatewayState>,
}

impl GatewayServer {
    /// Wrap a fully wired state.
    #[must_use]
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }

    /// Shared state (for tests and collaborators).
    #[must_use]
    pub fn state(&self) -> Arc<GatewayState> {
        Arc::clone(&self.state)
    }

    /// Build the router.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Bind and serve. With port 0 the kernel assigns one; the bound
    /// address is returned for clients and tests.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "gateway listening");

        let router = self.router();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "gateway server exited");
            }
        });
        Ok((local_addr, handle))
    }
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(json!({ "status": "ok" }))
}
