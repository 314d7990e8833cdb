//! MCP runtime for searchlens: JSON-RPC 2.0 dispatch over the Search
//! Console tool registry.
//!
//! The dispatcher is stateless per message: every inbound message is
//! handled independently and to completion, and every structurally
//! parseable message produces exactly one response. Failures of any kind
//! are caught at this boundary and folded into an error response;
//! nothing escapes to the transport.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

pub mod auth;
pub mod context;
pub mod gsc;
pub mod registry;
pub mod schema;
pub mod tools;
mod util;

use crate::auth::{FileTokenStore, GoogleOauth, TokenManager};
use crate::context::ExecutionContext;
use crate::registry::ToolRegistry;
use crate::schema::ValidationError;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "searchlens-mcp";

/// Token manager over the default file store and the env-configured
/// Google OAuth client. Shared across all connections of a process.
pub fn default_token_manager() -> Arc<TokenManager> {
    Arc::new(TokenManager::new(
        Arc::new(FileTokenStore::default_path()),
        Arc::new(GoogleOauth::from_env()),
    ))
}

/// JSON-RPC protocol error.
#[derive(Debug)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "Parse error".to_string(),
            data: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: Some(json!({ "method": method })),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }

    fn unknown_tool(name: &str) -> Self {
        Self {
            code: -32602,
            message: format!("Unknown tool '{name}'"),
            data: Some(json!({ "tool": name })),
        }
    }

    fn validation(tool: &str, err: &ValidationError) -> Self {
        Self {
            code: -32602,
            message: format!("Invalid arguments for '{tool}': {err}"),
            data: Some(json!({ "tool": tool, "issues": err.to_value() })),
        }
    }

    fn tool_failure(tool: &str, err: ToolError) -> Self {
        Self {
            code: -32603,
            message: err.message.clone(),
            data: Some(json!({ "tool": tool, "error": err.to_value() })),
        }
    }

    fn tool_timeout(tool: &str, timeout_secs: u64) -> Self {
        Self {
            code: -32603,
            message: format!("Tool '{tool}' did not complete within {timeout_secs}s"),
            data: Some(json!({
                "tool": tool,
                "reason": "tool_timeout",
                "timeout_secs": timeout_secs,
            })),
        }
    }
}

/// Tool-level failure payload, carried inside the protocol error's
/// `data` member.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
    pub docs_hint: Option<String>,
    pub details: Option<Value>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
            docs_hint: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.code,
            "message": self.message
        });
        if let Some(field) = &self.field {
            payload["field"] = Value::String(field.clone());
        }
        if let Some(docs_hint) = &self.docs_hint {
            payload["docs_hint"] = Value::String(docs_hint.clone());
        }
        if let Some(details) = &self.details {
            payload["details"] = details.clone();
        }
        payload
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}

pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn error_response(id: Value, error: RpcError) -> Value {
    let mut payload = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    });
    if let Some(data) = error.data {
        payload["error"]["data"] = data;
    }
    payload
}

/// The message a bare discovery probe is treated as (spec: a connection
/// with no body runs `tools/list` on the caller's behalf).
pub fn probe_message() -> Value {
    json!({ "jsonrpc": "2.0", "id": 0, "method": "tools/list" })
}

/// One dispatcher instance per connection: the registry is shared and
/// immutable, the execution context is this connection's own.
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    context: ExecutionContext,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>, context: ExecutionContext) -> Self {
        Self { registry, context }
    }

    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // Most likely a client response; the server issues no
            // outbound requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            self.handle_notification(method).await;
            None
        }
    }

    async fn handle_notification(&self, method: &str) {
        if !matches!(
            method,
            "notifications/initialized" | "notifications/cancelled"
        ) {
            tracing::debug!(event = "mcp_unknown_notification", method = %method, "Ignoring unknown notification");
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = self
            .registry
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.schema.describe(),
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let descriptor = self
            .registry
            .lookup(name)
            .ok_or_else(|| RpcError::unknown_tool(name))?;

        // Validation gates execution: invalid arguments never reach the
        // tool body.
        let validated = descriptor
            .schema
            .validate(&args)
            .map_err(|err| RpcError::validation(name, &err))?;

        tracing::debug!(
            event = "tool_call",
            connection = %self.context.connection_id,
            tool = %name,
            "Dispatching tool call"
        );
        let timeout = self.context.config.tool_timeout;
        let outcome = tokio::time::timeout(timeout, descriptor.execute(&self.context, validated))
            .await
            .map_err(|_| {
                tracing::warn!(event = "tool_timeout", tool = %name, timeout_secs = timeout.as_secs(), "Tool call timed out");
                RpcError::tool_timeout(name, timeout.as_secs())
            })?;

        match outcome {
            Ok(result) => {
                let payload = serde_json::to_value(result).map_err(|e| {
                    RpcError::tool_failure(
                        name,
                        ToolError::new(
                            searchlens_core::error::codes::INTERNAL_ERROR,
                            format!("failed to serialize tool result: {e}"),
                        ),
                    )
                })?;
                Ok(payload)
            }
            Err(err) => {
                tracing::debug!(event = "tool_error", tool = %name, code = %err.code, "Tool call failed");
                Err(RpcError::tool_failure(name, err))
            }
        }
    }
}

/// Serve the dispatcher over stdio with Content-Length framing until EOF.
pub async fn serve_stdio(server: &McpServer) -> Result<(), String> {
    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut stdout = io::stdout();

    loop {
        let incoming = read_framed_json(&mut reader)
            .await
            .map_err(|e| format!("Failed to read MCP message: {e}"))?;
        let Some(incoming) = incoming else {
            break;
        };

        let responses = server.handle_incoming_message(incoming).await;
        for response in responses {
            write_framed_json(&mut stdout, &response)
                .await
                .map_err(|e| format!("Failed to write MCP response: {e}"))?;
        }
    }

    Ok(())
}

async fn read_framed_json(
    reader: &mut BufReader<tokio::io::Stdin>,
) -> Result<Option<Value>, std::io::Error> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if content_length.is_none() {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        if line == "\r\n" {
            break;
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = line
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len.parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    let json: Value = serde_json::from_slice(&payload).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Invalid JSON payload: {e}"),
        )
    })?;
    Ok(Some(json))
}

async fn write_framed_json(
    writer: &mut tokio::io::Stdout,
    value: &Value,
) -> Result<(), std::io::Error> {
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    let header = format!(
        "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
        body.len()
    );
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::auth::{AuthError, MemoryTokenStore, RefreshFuture, TokenRefresher};
    use crate::context::RuntimeConfig;
    use crate::registry::ToolDescriptor;
    use crate::schema::{InputSchema, PropertySpec};
    use searchlens_core::auth::Token;
    use searchlens_core::content::ToolResult;

    struct NullRefresher;

    impl TokenRefresher for NullRefresher {
        fn refresh<'a>(&'a self, _token: &'a Token) -> RefreshFuture<'a> {
            Box::pin(async { Err(AuthError::RefreshFailed("not available in tests".into())) })
        }
    }

    fn test_context(timeout: Duration) -> ExecutionContext {
        let manager = Arc::new(TokenManager::new(
            Arc::new(MemoryTokenStore::new()),
            Arc::new(NullRefresher),
        ));
        let config = RuntimeConfig {
            tool_timeout: timeout,
            ..RuntimeConfig::default()
        };
        ExecutionContext::new(config, manager)
    }

    struct TestHarness {
        server: McpServer,
        echo_calls: Arc<AtomicUsize>,
        greet_args: Arc<SyncMutex<Option<Map<String, Value>>>>,
    }

    fn harness() -> TestHarness {
        harness_with_timeout(Duration::from_secs(5))
    }

    fn harness_with_timeout(timeout: Duration) -> TestHarness {
        let echo_calls = Arc::new(AtomicUsize::new(0));
        let greet_args: Arc<SyncMutex<Option<Map<String, Value>>>> =
            Arc::new(SyncMutex::new(None));

        let mut registry = ToolRegistry::new();
        let calls = echo_calls.clone();
        registry
            .register(ToolDescriptor::new(
                "echo",
                "Return the message unchanged.",
                InputSchema::new().property("msg", PropertySpec::string()),
                move |_ctx, args| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let msg = args
                        .get("msg")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    Box::pin(async move { Ok(ToolResult::text(msg)) })
                },
            ))
            .unwrap();
        registry
            .register(ToolDescriptor::new(
                "boom",
                "Always fails.",
                InputSchema::new(),
                |_ctx, _args| {
                    Box::pin(async {
                        Err(ToolError::new("internal_error", "synthetic tool failure"))
                    })
                },
            ))
            .unwrap();
        let captured = greet_args.clone();
        registry
            .register(ToolDescriptor::new(
                "greet",
                "Greets with a default name.",
                InputSchema::new().property(
                    "name",
                    PropertySpec::string().default_value(json!("world")),
                ),
                move |_ctx, args| {
                    *captured.lock().unwrap() = Some(args.clone());
                    let name = args
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    Box::pin(async move { Ok(ToolResult::text(format!("hello {name}"))) })
                },
            ))
            .unwrap();
        registry
            .register(ToolDescriptor::new(
                "sleepy",
                "Never finishes in time.",
                InputSchema::new(),
                |_ctx, _args| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_secs(600)).await;
                        Ok(ToolResult::text("done"))
                    })
                },
            ))
            .unwrap();

        TestHarness {
            server: McpServer::new(Arc::new(registry), test_context(timeout)),
            echo_calls,
            greet_args,
        }
    }

    fn request(id: Value, method: &str, params: Value) -> Value {
        let mut message = json!({ "jsonrpc": "2.0", "id": id, "method": method });
        if !params.is_null() {
            message["params"] = params;
        }
        message
    }

    async fn single(server: &McpServer, message: Value) -> Value {
        let mut responses = server.handle_incoming_message(message).await;
        assert_eq!(responses.len(), 1, "expected exactly one response");
        responses.remove(0)
    }

    #[tokio::test]
    async fn every_request_gets_one_response_with_echoed_id() {
        let h = harness();
        for (id, method) in [
            (json!(1), "initialize"),
            (json!("abc"), "tools/list"),
            (json!(7), "ping"),
        ] {
            let response = single(&h.server, request(id.clone(), method, Value::Null)).await;
            assert_eq!(response["id"], id);
            assert!(response.get("result").is_some());
            assert!(response.get("error").is_none());
        }
    }

    #[tokio::test]
    async fn failing_tool_still_produces_a_response() {
        let h = harness();
        let response = single(
            &h.server,
            request(json!(2), "tools/call", json!({ "name": "boom" })),
        )
        .await;
        assert_eq!(response["id"], json!(2));
        assert_eq!(response["error"]["code"], json!(-32603));
        assert_eq!(
            response["error"]["data"]["error"]["error"],
            json!("internal_error")
        );
        assert!(response.get("result").is_none());
    }

    #[tokio::test]
    async fn tools_list_order_is_stable_across_calls() {
        let h = harness();
        let before = single(&h.server, request(json!(1), "tools/list", Value::Null)).await;

        for _ in 0..3 {
            single(
                &h.server,
                request(
                    json!(9),
                    "tools/call",
                    json!({ "name": "echo", "arguments": { "msg": "x" } }),
                ),
            )
            .await;
        }

        let after = single(&h.server, request(json!(1), "tools/list", Value::Null)).await;
        assert_eq!(before, after);
        let names: Vec<&str> = after["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["echo", "boom", "greet", "sleepy"]);
    }

    #[tokio::test]
    async fn missing_required_argument_never_reaches_execute() {
        let h = harness();
        let response = single(
            &h.server,
            request(
                json!(2),
                "tools/call",
                json!({ "name": "echo", "arguments": {} }),
            ),
        )
        .await;
        assert_eq!(response["error"]["code"], json!(-32602));
        assert!(
            response["error"]["message"]
                .as_str()
                .unwrap()
                .contains("msg")
        );
        assert_eq!(h.echo_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_by_name() {
        let h = harness();
        let response = single(
            &h.server,
            request(json!(3), "tools/call", json!({ "name": "nope" })),
        )
        .await;
        assert!(
            response["error"]["message"]
                .as_str()
                .unwrap()
                .contains("nope")
        );
        assert_eq!(response["error"]["data"]["tool"], json!("nope"));
        assert_eq!(h.echo_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tools_list_is_identical_across_connections() {
        let a = single(
            &harness().server,
            request(json!(1), "tools/list", Value::Null),
        )
        .await;
        let b = single(
            &harness().server,
            request(json!(1), "tools/list", Value::Null),
        )
        .await;
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[tokio::test]
    async fn omitted_argument_with_default_reaches_execute_with_the_default() {
        let h = harness();
        let response = single(
            &h.server,
            request(
                json!(4),
                "tools/call",
                json!({ "name": "greet", "arguments": {} }),
            ),
        )
        .await;
        assert_eq!(
            response["result"]["content"][0]["text"],
            json!("hello world")
        );
        let captured = h.greet_args.lock().unwrap().clone().unwrap();
        assert_eq!(captured["name"], json!("world"));
    }

    #[tokio::test]
    async fn successful_call_wraps_tool_result_as_content() {
        let h = harness();
        let response = single(
            &h.server,
            request(
                json!(4),
                "tools/call",
                json!({ "name": "echo", "arguments": { "msg": "hi" } }),
            ),
        )
        .await;
        assert_eq!(response["id"], json!(4));
        assert_eq!(
            response["result"],
            json!({ "content": [{ "type": "text", "text": "hi" }] })
        );
    }

    #[tokio::test]
    async fn slow_tool_times_out_with_a_structured_error() {
        let h = harness_with_timeout(Duration::from_millis(50));
        let response = single(
            &h.server,
            request(json!(5), "tools/call", json!({ "name": "sleepy" })),
        )
        .await;
        assert_eq!(response["error"]["code"], json!(-32603));
        assert_eq!(response["error"]["data"]["reason"], json!("tool_timeout"));
    }

    #[tokio::test]
    async fn unknown_method_is_rejected_with_the_method_name() {
        let h = harness();
        let response = single(&h.server, request(json!(6), "resources/list", Value::Null)).await;
        assert_eq!(response["error"]["code"], json!(-32601));
        assert_eq!(response["error"]["data"]["method"], json!("resources/list"));
    }

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let h = harness();
        let responses = h
            .server
            .handle_incoming_message(
                json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
            )
            .await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn batches_are_answered_item_by_item() {
        let h = harness();
        let responses = h
            .server
            .handle_incoming_message(json!([
                { "jsonrpc": "2.0", "id": 1, "method": "ping" },
                { "jsonrpc": "2.0", "id": 2, "method": "tools/list" },
            ]))
            .await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], json!(1));
        assert_eq!(responses[1]["id"], json!(2));

        let empty = h.server.handle_incoming_message(json!([])).await;
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0]["error"]["code"], json!(-32600));
    }

    #[tokio::test]
    async fn malformed_envelopes_are_rejected() {
        let h = harness();
        let response = single(&h.server, json!("not a request")).await;
        assert_eq!(response["error"]["code"], json!(-32600));
        assert_eq!(response["id"], Value::Null);

        let response = single(&h.server, json!({ "id": 1, "method": "ping" })).await;
        assert_eq!(response["error"]["code"], json!(-32600));

        let response = single(
            &h.server,
            request(json!(8), "tools/call", json!({ "name": "echo", "arguments": 5 })),
        )
        .await;
        assert_eq!(response["error"]["code"], json!(-32602));
    }
}
