//! The stdio loop: line-delimited JSON-RPC on stdin/stdout.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::dispatch::ToolBackend;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse, PARSE_ERROR};
use crate::protocol::handle_request;

/// Serve JSON-RPC over stdin/stdout until EOF.
///
/// Every line is one request; every response is one line. Non-JSON lines
/// (stray logs from a misconfigured client) are skipped rather than
/// answered, matching how permissive MCP hosts behave.
pub async fn serve_stdio(backend: ToolBackend) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('{') {
            warn!(line = trimmed, "skipping non-JSON input line");
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => {
                debug!(method = %request.method, "handling request");
                // Notifications (no id) other than initialized are handled
                // but answered only when the client asked for an answer.
                let had_id = request.id.is_some();
                let response = handle_request(&backend, request).await;
                if !had_id {
                    continue;
                }
                response
            }
            Err(err) => JsonRpcResponse::failure(
                parse_id(trimmed),
                PARSE_ERROR,
                format!("unparseable request: {err}"),
            ),
        };

        let mut out = response.to_line();
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

/// Best-effort id recovery from a malformed request line.
fn parse_id(line: &str) -> Option<Value> {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("id").cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_recovery_from_valid_json() {
        assert_eq!(
            parse_id(r#"{"id": 7, "method": 3}"#),
            Some(serde_json::json!(7))
        );
        assert_eq!(parse_id("not json"), None);
    }
}
