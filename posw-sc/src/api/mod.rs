//! REST API for the scanner capture service
//!
//! Control endpoints for the scanner session, scan history access, a
//! standalone GS1 decoder and an SSE event stream.

pub mod handlers;
pub mod sse;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use posw_common::config::ScannerConfig;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::error::{Error, Result};
use crate::session::ScannerSession;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Scanner session
    pub session: Arc<ScannerSession>,
    /// Configuration used by `POST /scanner/connect` when no override is given
    pub scanner_config: ScannerConfig,
    /// Server port
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(health_check))

        // API v1 routes
        .nest("/api/v1", Router::new()
            // Session lifecycle
            .route("/scanner/status", get(handlers::get_status))
            .route("/scanner/connect", post(handlers::connect))
            .route("/scanner/disconnect", post(handlers::disconnect))
            .route("/scanner/start", post(handlers::start_scanning))
            .route("/scanner/stop", post(handlers::stop_scanning))
            .route("/scanner/scan", post(handlers::scan_single))

            // Results
            .route("/scanner/last", get(handlers::get_last_result))
            .route("/scanner/history", get(handlers::get_history).delete(handlers::clear_history))

            // GS1 decoder
            .route("/gs1/decode", post(handlers::decode_gs1))

            // SSE events
            .route("/events", get(sse::event_stream))
        )
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "posw-sc",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
        "scanner_state": state.session.state().await,
    }))
}

/// Bind `port` on all interfaces and serve `app` until `shutdown` resolves
pub async fn serve<F>(app: Router, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
