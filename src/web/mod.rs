//! REST API over question search and the question catalog.
//!
//! # Example
//!
//! ```rust,ignore
//! use examsearch::web::{AppState, WebServer};
//!
//! let state = AppState::open(config, &root).await?;
//! WebServer::new(state).start("127.0.0.1", 8000).await?;
//! ```

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use anyhow::{Context, Result};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// HTTP server for the search API.
pub struct WebServer {
    state: AppState,
}

impl WebServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Serve until Ctrl-C.
    pub async fn start(self, host: &str, port: u16) -> Result<()> {
        let addr = format!("{}:{}", host, port);

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = create_router(self.state)
            .layer(cors)
            .layer(TraceLayer::new_for_http());

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        info!("Starting API server at http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .with_context(|| "API server failed")?;

        info!("API server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        // without a signal handler, serve until the process is killed
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
