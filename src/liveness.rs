//! Static status page for uptime probes.

use std::net::SocketAddr;

use axum::{Router, response::Html, routing::get};

const PAGE: &str = "<html><body><h1>Bot is Running</h1></body></html>";

async fn status_page() -> Html<&'static str> {
    Html(PAGE)
}

pub fn router() -> Router {
    Router::new().route("/", get(status_page))
}

/// Serve the status page on `0.0.0.0:port`. A bind failure is logged and
/// the bot keeps running without the page.
pub async fn run_liveness_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind liveness server on {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("Liveness page listening on {}", addr);

    if let Err(e) = axum::serve(listener, router()).await {
        tracing::error!("Liveness server error: {}", e);
    }
}
