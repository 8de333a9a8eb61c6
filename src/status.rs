use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::server::Server;

/// Serve the operator status endpoint until the token is cancelled.
///
/// `GET /` returns the one-line status string; `GET /api/status`
/// returns the same counts as JSON.
pub async fn run_status_server(addr: SocketAddr, server: Arc<Server>, token: CancellationToken) {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(status_text_handler))
        .route("/api/status", get(status_json_handler))
        .layer(cors)
        .with_state(server);

    tracing::info!(addr = %addr, "Starting status server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(addr = %addr, error = %error, "Failed to bind status server");
            return;
        }
    };

    let shutdown = async move { token.cancelled().await };
    if let Err(error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!(error = %error, "Status server failed");
    }
}

async fn status_text_handler(State(server): State<Arc<Server>>) -> impl IntoResponse {
    server.status_string().await
}

async fn status_json_handler(State(server): State<Arc<Server>>) -> impl IntoResponse {
    Json(server.status().await)
}
