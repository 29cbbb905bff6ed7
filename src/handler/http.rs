//! HTTP transport for the counter handler.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `GET /count`, `POST /count`: one increment; responds with the envelope's
//!   status, headers and body. Any request body is passed along as payload.
//! - `GET /health`: liveness check returning `{ "ok": true }`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::warn;

use super::{CounterHandler, Invocation, ResponseEnvelope};
use crate::counter::CounterBackend;

/// Build an axum `Router` serving the given handler.
pub fn router<B: CounterBackend + 'static>(handler: Arc<CounterHandler<B>>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/count", get(count_handler::<B>).post(count_handler::<B>))
        .with_state(handler)
}

/// Serve the handler over HTTP at the given address (e.g. `"0.0.0.0:3000"`).
pub async fn serve<B: CounterBackend + 'static>(
    handler: Arc<CounterHandler<B>>,
    addr: &str,
) -> Result<(), std::io::Error> {
    let app = router(handler);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

/// `GET /health`: returns `{ "ok": true }`.
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

/// `GET|POST /count`: run one increment.
async fn count_handler<B: CounterBackend + 'static>(
    State(handler): State<Arc<CounterHandler<B>>>,
    body: Bytes,
) -> Response {
    let payload = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
    let envelope = handler.handle(Invocation::with_payload(payload)).await;
    into_response(envelope)
}

/// Copy the envelope's status, headers and body onto an HTTP response.
fn into_response(envelope: ResponseEnvelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = (status, envelope.body).into_response();
    let headers = response.headers_mut();
    for (name, value) in &envelope.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }
    response
}
