//! The gateway HTTP endpoint.
//!
//! Implements the wire contract: POST-only, byte-capped body, advisory
//! rate/usage headers on success, normalized JSON payloads on failure.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;

use modelgate_core::gateway::{ErrorCode, ErrorPayload, GatewayOutcome, GenerateRequest};

use crate::state::AppState;

pub async fn handle_generate(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    if parts.method != Method::POST {
        return ErrorPayload::new(
            ErrorCode::MethodNotAllowed,
            "Use POST for this endpoint",
        )
        .into_response();
    }

    let cap = state.gateway.config().max_body_bytes;

    // Content-Length first; the streamed byte count is the fallback for
    // chunked bodies.
    let declared = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok());
    if declared.is_some_and(|len| len > cap) {
        return payload_too_large(cap);
    }

    let bytes = match axum::body::to_bytes(body, cap).await {
        Ok(bytes) => bytes,
        Err(e) if is_length_limit(&e) => return payload_too_large(cap),
        Err(_) => {
            return ErrorPayload::new(ErrorCode::BadRequest, "Failed to read request body")
                .into_response();
        }
    };

    let gen_request: GenerateRequest = match serde_json::from_slice(&bytes) {
        Ok(r) => r,
        Err(e) => {
            return ErrorPayload::new(ErrorCode::BadRequest, format!("Invalid JSON body: {}", e))
                .into_response();
        }
    };

    let socket = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|c| c.0);

    match state.gateway.handle(&parts.headers, socket, gen_request).await {
        Ok(outcome) => success_response(outcome),
        Err(payload) => payload.into_response(),
    }
}

// The 413 contract is reserved for the byte ceiling; any other body
// read failure (client abort, malformed framing) is a bad request.
fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

fn payload_too_large(cap: usize) -> Response {
    ErrorPayload::new(
        ErrorCode::PayloadTooLarge,
        format!("Request body exceeds the {} byte limit", cap),
    )
    .into_response()
}

fn success_response(outcome: GatewayOutcome) -> Response {
    let mut response =
        (StatusCode::OK, Json(json!({ "ok": true, "data": outcome.data }))).into_response();

    let headers = response.headers_mut();
    insert_header(headers, "x-ratelimit-remaining", &outcome.rate_remaining.to_string());
    insert_header(headers, "x-ratelimit-reset", &outcome.rate_reset_epoch.to_string());
    insert_header(headers, "x-ai-remaining", &outcome.usage.remaining.to_string());
    insert_header(headers, "x-ai-limit", &outcome.usage.limit.to_string());
    insert_header(headers, "x-ai-membership", &outcome.usage.membership);
    insert_header(headers, "x-ai-burst-remaining", &outcome.usage.burst_remaining.to_string());
    insert_header(headers, "x-ai-burst-limit", &outcome.usage.burst_limit.to_string());
    insert_header(headers, "x-ai-provider-used", outcome.provider.as_str());

    response
}

// Advisory headers only: a value that cannot be encoded is dropped, not
// an error.
fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn test_body_over_cap_is_a_length_limit_error() {
        let err = axum::body::to_bytes(Body::from("x".repeat(100)), 10)
            .await
            .expect_err("body over the cap must fail");
        assert!(is_length_limit(&err));
    }

    #[tokio::test]
    async fn test_io_failure_is_not_a_length_limit_error() {
        let err = axum::Error::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "client hung up",
        ));
        assert!(!is_length_limit(&err));
    }

    #[tokio::test]
    async fn test_body_under_cap_reads_fully() {
        let bytes = axum::body::to_bytes(Body::from("hello"), 10).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }
}
