use std::net::SocketAddr;

use axum::{Json, Router, extract::State, routing::get};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::state::{SnifferState, SnifferStatus};

/// Bind the status listener. A taken or invalid address disables the
/// status server and is recorded in the shared state.
pub async fn bind(addr: SocketAddr, state: &SnifferState) -> Option<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!(http_addr = %addr, "Status server listening");
            Some(listener)
        }
        Err(e) => {
            error!(http_addr = %addr, error = %e, "Status server disabled");
            state
                .disable("status_server", format!("failed to bind {addr}: {e}"))
                .await;
            None
        }
    }
}

pub fn router(state: SnifferState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn status_handler(State(state): State<SnifferState>) -> Json<SnifferStatus> {
    Json(state.snapshot().await)
}
