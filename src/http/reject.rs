//! Header-equality reject rule.
//!
//! A single exact string comparison against one configured header. A match
//! short-circuits with 403; anything else declines and lets the pipeline
//! continue.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::RejectConfig;

pub async fn reject_middleware(
    State(rule): State<RejectConfig>,
    request: Request,
    next: Next,
) -> Response {
    if !rule.enabled {
        return next.run(request).await;
    }

    let matched = request
        .headers()
        .get(&rule.header)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == rule.value);

    if matched {
        tracing::warn!(header = %rule.header, "request rejected by header rule");
        return (StatusCode::FORBIDDEN, "Request rejected").into_response();
    }
    next.run(request).await
}
