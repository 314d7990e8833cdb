//! MCP transport endpoints.
//!
//! `POST /mcp` is a plain JSON request/response exchange. `/sse` is the
//! stream transport adapter: a one-shot push stream that frames exactly
//! one response per connection and always closes; callers must not
//! assume the stream stays open for further exchanges.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::Value;

use searchlens_mcp_runtime::context::ExecutionContext;
use searchlens_mcp_runtime::{McpServer, RpcError, error_response, probe_message};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mcp", post(mcp_post).get(mcp_get))
        .route("/sse", post(sse_post).get(sse_probe))
}

/// One dispatcher per connection: shared registry, fresh context.
fn build_server(state: &AppState) -> McpServer {
    let context = ExecutionContext::new(state.runtime.clone(), state.auth.clone());
    McpServer::new(state.registry.clone(), context)
}

async fn mcp_get() -> Response {
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

async fn mcp_post(State(state): State<AppState>, body: Bytes) -> Response {
    let incoming: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => {
            return (
                StatusCode::OK,
                Json(error_response(Value::Null, RpcError::parse_error())),
            )
                .into_response();
        }
    };

    let server = build_server(&state);
    let responses = server.handle_incoming_message(incoming).await;

    if responses.is_empty() {
        return StatusCode::ACCEPTED.into_response();
    }

    if responses.len() == 1 {
        return (
            StatusCode::OK,
            Json(responses.into_iter().next().unwrap_or(Value::Null)),
        )
            .into_response();
    }

    (StatusCode::OK, Json(Value::Array(responses))).into_response()
}

// The keep-alive comment signals the stream is live before any data
// message is pushed.
const KEEP_ALIVE_FRAME: &str = ": keep-alive\n\n";

fn event_frame(payload: &Value) -> String {
    format!("event: message\ndata: {payload}\n\n")
}

fn stream_response(frames: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache, no-store"),
            // Disable proxy buffering so the single event flushes.
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        frames,
    )
        .into_response()
}

/// One-shot SSE exchange: keep-alive, then exactly one framed response
/// per structurally parseable message, then close. A malformed payload
/// yields one error frame not attributable to any id.
async fn sse_post(State(state): State<AppState>, body: Bytes) -> Response {
    let mut frames = String::from(KEEP_ALIVE_FRAME);

    if body.is_empty() {
        return sse_probe(State(state)).await;
    }

    match serde_json::from_slice::<Value>(&body) {
        Ok(incoming) => {
            let server = build_server(&state);
            for response in server.handle_incoming_message(incoming).await {
                frames.push_str(&event_frame(&response));
            }
            tracing::debug!(event = "mcp_sse_exchange", "SSE exchange completed");
        }
        Err(err) => {
            tracing::debug!(event = "mcp_sse_parse_error", error = %err, "Malformed SSE request body");
            frames.push_str(&event_frame(&error_response(
                Value::Null,
                RpcError::parse_error(),
            )));
        }
    }

    stream_response(frames)
}

/// Bare connection open (discovery probe): run `tools/list` on the
/// caller's behalf, push the one response, close.
async fn sse_probe(State(state): State<AppState>) -> Response {
    let server = build_server(&state);
    let mut frames = String::from(KEEP_ALIVE_FRAME);
    for response in server.handle_incoming_message(probe_message()).await {
        frames.push_str(&event_frame(&response));
    }
    tracing::debug!(event = "mcp_sse_probe", "SSE discovery probe served");
    stream_response(frames)
}
