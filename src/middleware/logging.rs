// src/middleware/logging.rs
use axum::{
    extract::{MatchedPath, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use uuid::Uuid;

/// Request logging middleware that adds structured logging for all HTTP requests
pub async fn request_logging_middleware(
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().clone();
    let uri = req.uri().clone();
    let matched_path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_owned())
        .unwrap_or_else(|| "unknown".to_owned());

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %matched_path,
        uri = %uri,
        "incoming request"
    );

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            request_id = %request_id,
            method = %method,
            path = %matched_path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "request completed (server error)"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            request_id = %request_id,
            method = %method,
            path = %matched_path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "request completed (client error)"
        );
    } else {
        tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %matched_path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "request completed"
        );
    }

    Ok(response)
}
