use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use crate::application::error::ErrorReport;

use super::CACHE_HEADER;

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();
    let cache = response
        .headers()
        .get(CACHE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    // Origin answers such as 404 are regular lookups. Lockout rejections are
    // already warned about by the handler.
    match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) if status == StatusCode::INTERNAL_SERVER_ERROR => {
            let detail = report
                .messages
                .first()
                .cloned()
                .unwrap_or_else(|| "no diagnostic available".to_string());
            error!(
                target = "cache_stnsd::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = report.source,
                detail = %detail,
                chain = ?report.messages,
                "request failed",
            );
        }
        _ => {
            debug!(
                target = "cache_stnsd::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                cache = %cache,
                "request served",
            );
        }
    }

    response
}
