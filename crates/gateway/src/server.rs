//! Line-delimited JSON-RPC server on stdin/stdout.
//!
//! One reader loop parses requests; each `tools/call` runs on its own task
//! so slow upstreams never block other invocations. All responses funnel
//! through a single writer task.

use std::sync::Arc;

use {
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        sync::mpsc,
    },
    tracing::{debug, error, info, warn},
};

use crate::{
    context::GatewayContext,
    protocol::{
        JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND, PARSE_ERROR, ToolCallParams,
        ToolCallResult,
    },
    schema::tool_catalog,
    tools::call_tool,
};

const SERVER_NAME: &str = "finmux";
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Serve requests from stdin until EOF.
pub async fn serve_stdio(ctx: Arc<GatewayContext>) -> std::io::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("gateway listening on stdio");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "unparseable request line");
                send(&tx, &JsonRpcResponse::failure(
                    serde_json::Value::Null,
                    PARSE_ERROR,
                    format!("parse error: {e}"),
                ));
                continue;
            },
        };

        let ctx = Arc::clone(&ctx);
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(response) = handle_request(&ctx, request).await {
                send(&tx, &response);
            }
        });
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// Handle one request. `None` for notifications (no id).
pub async fn handle_request(
    ctx: &GatewayContext,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let id = request.id.clone();
    match request.method.as_str() {
        "initialize" => {
            let id = id?;
            Some(JsonRpcResponse::success(id, serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })))
        },
        "notifications/initialized" => None,
        "tools/list" => {
            let id = id?;
            Some(JsonRpcResponse::success(
                id,
                serde_json::json!({"tools": tool_catalog()}),
            ))
        },
        "tools/call" => {
            let id = id?;
            let params: ToolCallParams = match request
                .params
                .map(serde_json::from_value)
                .transpose()
            {
                Ok(Some(params)) => params,
                Ok(None) | Err(_) => {
                    return Some(JsonRpcResponse::failure(
                        id,
                        crate::protocol::INVALID_PARAMS,
                        "tools/call requires {name, arguments}",
                    ));
                },
            };

            let envelope = match call_tool(ctx, &params.name, &params.arguments).await {
                Ok(record) => ToolCallResult::text(record.to_string()),
                Err(e) => {
                    debug!(tool = %params.name, error = %e, "tool call failed");
                    ToolCallResult::error(e.to_string())
                },
            };
            match serde_json::to_value(&envelope) {
                Ok(result) => Some(JsonRpcResponse::success(id, result)),
                Err(e) => {
                    error!(error = %e, "failed to serialize tool result");
                    Some(JsonRpcResponse::failure(
                        id,
                        crate::protocol::INTERNAL_ERROR,
                        "failed to serialize tool result",
                    ))
                },
            }
        },
        other => {
            debug!(method = %other, "unknown method");
            let id = id?;
            Some(JsonRpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("unknown method: {other}"),
            ))
        },
    }
}

fn send(tx: &mpsc::UnboundedSender<String>, response: &JsonRpcResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            let _ = tx.send(line);
        },
        Err(e) => error!(error = %e, "failed to serialize response"),
    }
}
