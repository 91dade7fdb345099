//! MCP protocol handlers: `initialize`, `tools/list`, and `tools/call`
//! routing on top of the JSON-RPC framing.

use serde_json::{json, Value};
use tracing::info;

use crate::dispatch::{dispatch, ToolBackend};
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND};
use crate::tools;

/// Protocol version answered to `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name/version advertised in `initialize`.
pub const SERVER_NAME: &str = "webrecall";

fn handle_initialize(id: Option<Value>) -> JsonRpcResponse {
    info!("mcp client initialized");
    JsonRpcResponse::success(
        id,
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        }),
    )
}

fn handle_list_tools(id: Option<Value>) -> JsonRpcResponse {
    let tools = tools::catalog();
    JsonRpcResponse::success(id, json!({"tools": tools}))
}

async fn handle_tool_call(
    backend: &ToolBackend,
    id: Option<Value>,
    params: Option<Value>,
) -> JsonRpcResponse {
    let Some(params) = params else {
        return JsonRpcResponse::failure(id, INVALID_PARAMS, "params required");
    };
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return JsonRpcResponse::failure(id, INVALID_PARAMS, "params.name required");
    };
    let args = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    let envelope = dispatch(backend, name, &args).await;
    // MCP tool results are content blocks; the envelope rides in a single
    // JSON text block.
    let is_error = envelope
        .get("success")
        .and_then(Value::as_bool)
        .is_some_and(|ok| !ok);
    JsonRpcResponse::success(
        id,
        json!({
            "content": [{
                "type": "text",
                "text": envelope.to_string(),
            }],
            "isError": is_error,
        }),
    )
}

/// Route one request to its handler.
pub async fn handle_request(backend: &ToolBackend, request: JsonRpcRequest) -> JsonRpcResponse {
    match request.method.as_str() {
        "initialize" => handle_initialize(request.id),
        "notifications/initialized" | "initialized" => {
            // Notification; answered with an empty result when an id is
            // present, silently accepted otherwise.
            JsonRpcResponse::success(request.id, json!({}))
        }
        "tools/list" => handle_list_tools(request.id),
        "tools/call" => handle_tool_call(backend, request.id, request.params).await,
        "shutdown" => JsonRpcResponse::success(request.id, json!({})),
        other => JsonRpcResponse::failure(
            request.id,
            METHOD_NOT_FOUND,
            format!("unknown method '{other}'"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_reports_protocol_and_server() {
        let response = handle_initialize(Some(json!(1)));
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
    }

    #[test]
    fn tools_list_returns_catalog() {
        let response = handle_list_tools(Some(json!(2)));
        let tools = response.result.unwrap();
        assert_eq!(tools["tools"].as_array().unwrap().len(), 15);
    }
}
