//! MCP server implementation with stdin/stdout JSON-RPC handling.

use std::io;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use crate::PROTOCOL_VERSION;
use crate::protocol::{
    CallToolParams, Implementation, InitializeParams, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ServerCapabilities, ToolsCapability,
};
use crate::tools::ToolRegistry;

/// Errors from either end of an MCP connection.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server returned error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("server closed the connection")]
    Closed,

    #[error("timed out waiting for the server")]
    Timeout,
}

/// MCP server that handles JSON-RPC over stdin/stdout.
pub struct McpServer {
    info: Implementation,
    tools: ToolRegistry,
    initialized: bool,
}

impl McpServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>, tools: ToolRegistry) -> Self {
        Self {
            info: Implementation {
                name: name.into(),
                version: version.into(),
            },
            tools,
            initialized: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Serve on the process's stdin and stdout until stdin closes.
    pub async fn run(&mut self) -> Result<(), McpError> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve line-delimited JSON-RPC until `reader` reaches EOF.
    pub async fn serve<R, W>(&mut self, reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(server = %self.info.name, "MCP server starting");

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            debug!(request = %line, "received request");

            if let Some(response) = self.handle_line(&line) {
                let mut response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "sending response");
                response_json.push('\n');
                writer.write_all(response_json.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        info!(server = %self.info.name, "MCP server shutting down");
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, "failed to parse request");
                return Some(JsonRpcResponse::error(
                    None,
                    -32700,
                    format!("Parse error: {}", e),
                ));
            }
        };

        // Notifications carry no id and get no response
        if request.id.is_none() {
            debug!(method = %request.method, "notification");
            return None;
        }

        Some(match request.method.as_str() {
            "initialize" => into_response(request.id.clone(), self.handle_initialize(&request)),
            "ping" => JsonRpcResponse::success(request.id, Value::Object(Default::default())),
            "tools/list" => into_response(request.id.clone(), self.handle_list_tools()),
            "tools/call" => into_response(request.id.clone(), self.handle_call_tool(&request)),
            other => JsonRpcResponse::error(
                request.id,
                -32601,
                format!("Unknown method: {}", other),
            ),
        })
    }

    fn handle_initialize(&mut self, request: &JsonRpcRequest) -> Result<Value, String> {
        let params: InitializeParams = request
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| format!("Invalid initialize params: {}", e))?
            .ok_or("Missing initialize params")?;

        debug!(
            client = %params.client_info.name,
            version = %params.protocol_version,
            "client initializing"
        );
        self.initialized = true;

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: self.info.clone(),
        };

        serde_json::to_value(result).map_err(|e| e.to_string())
    }

    fn handle_list_tools(&self) -> Result<Value, String> {
        let result = ListToolsResult {
            tools: self.tools.definitions(),
        };
        serde_json::to_value(result).map_err(|e| e.to_string())
    }

    fn handle_call_tool(&self, request: &JsonRpcRequest) -> Result<Value, String> {
        let params: CallToolParams = request
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| format!("Invalid call params: {}", e))?
            .ok_or("Missing call params")?;

        debug!(tool = %params.name, "executing tool");

        let result = self.tools.execute(&params.name, &params.arguments);
        serde_json::to_value(result).map_err(|e| e.to_string())
    }
}

fn into_response(id: Option<Value>, result: Result<Value, String>) -> JsonRpcResponse {
    match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, -32603, e),
    }
}
