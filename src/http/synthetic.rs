//! Synthetic JSON responses.
//!
//! A configured path is answered locally with a generated document instead
//! of being proxied. Useful as a liveness probe that exercises the full
//! middleware stack without touching the upstream.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::config::SyntheticConfig;

/// Build the synthetic response for one request.
pub fn synthetic_response(cfg: &SyntheticConfig, request_id: &str) -> Response {
    let status = StatusCode::from_u16(cfg.status).unwrap_or(StatusCode::OK);
    let body = serde_json::json!({
        "gateway": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "request_id": request_id,
        "path": cfg.path,
    });
    (status, Json(body)).into_response()
}
