//! Stdio MCP client used to ask a server which tools it provides.

use std::process::Stdio;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::PROTOCOL_VERSION;
use crate::protocol::{
    Implementation, InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, ToolDefinition,
};
use crate::server::McpError;

/// How long a probed server gets to answer the whole handshake.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// A running MCP server process spoken to over its stdin and stdout.
pub struct StdioClient {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl StdioClient {
    /// Launch `command` through `sh -c`.
    ///
    /// The server's stderr is inherited so its logs stay visible.
    pub fn spawn(command: &str) -> Result<Self, McpError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or(McpError::Closed)?;
        let stdout = child.stdout.take().ok_or(McpError::Closed)?;

        debug!(command, "spawned MCP server");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
        })
    }

    async fn send(&mut self, request: &JsonRpcRequest) -> Result<(), McpError> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Send a request and wait for the response carrying its id.
    ///
    /// Server-initiated notifications and log lines on stdout are skipped.
    pub async fn request<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, McpError> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&JsonRpcRequest::new(id, method, params)).await?;

        loop {
            let line = self.stdout.next_line().await?.ok_or(McpError::Closed)?;
            let response: JsonRpcResponse = match serde_json::from_str(&line) {
                Ok(response) => response,
                Err(_) => {
                    debug!(line = %line, "ignoring non-response output");
                    continue;
                }
            };
            if response.id != Some(Value::from(id)) {
                continue;
            }

            if let Some(error) = response.error {
                return Err(McpError::Rpc {
                    code: error.code,
                    message: error.message,
                });
            }
            return Ok(serde_json::from_value(
                response.result.unwrap_or(Value::Null),
            )?);
        }
    }

    pub async fn notify(&mut self, method: &str) -> Result<(), McpError> {
        self.send(&JsonRpcRequest::notification(method)).await
    }

    /// Perform the initialize handshake.
    pub async fn initialize(&mut self) -> Result<InitializeResult, McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: Implementation {
                name: "mcproto".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let result: InitializeResult = self
            .request("initialize", Some(serde_json::to_value(params)?))
            .await?;
        self.notify("notifications/initialized").await?;

        debug!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "initialized MCP session"
        );
        Ok(result)
    }

    pub async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>, McpError> {
        let result: ListToolsResult = self.request("tools/list", Some(json!({}))).await?;
        Ok(result.tools)
    }

    /// Stop the server process.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "failed to stop MCP server");
        }
    }
}

/// Launch `command`, list its tools and stop it again.
///
/// Returns the server's advertised name alongside its tool names.
pub async fn probe_tools(command: &str) -> Result<(String, Vec<String>), McpError> {
    let mut client = StdioClient::spawn(command)?;

    let handshake = async {
        let init = client.initialize().await?;
        let tools = client.list_tools().await?;
        Ok::<_, McpError>((init.server_info.name, tools))
    };
    let outcome = tokio::time::timeout(PROBE_TIMEOUT, handshake).await;
    client.shutdown().await;

    let (name, tools) = outcome.map_err(|_| McpError::Timeout)??;
    Ok((name, tools.into_iter().map(|t| t.name).collect()))
}
