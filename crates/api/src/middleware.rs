use std::time::Instant;

use axum::{middleware::Next, response::Response};
use tracing::{info, warn};

/// Log one line per request with its outcome and latency.
pub async fn trace_requests(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        warn!(%method, path = %path, status, elapsed_ms, "request failed");
    } else {
        info!(%method, path = %path, status, elapsed_ms, "request");
    }
    response
}
