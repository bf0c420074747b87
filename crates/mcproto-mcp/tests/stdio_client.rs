//! StdioClient against scripted shell servers.

use mcproto_mcp::{McpError, StdioClient, probe_tools};
use pretty_assertions::assert_eq;

/// A fake server: answers initialize, swallows the initialized
/// notification, prints a log line, then answers tools/list.
const SCRIPTED_SERVER: &str = r#"
read -r init
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"scripted","version":"0.0.1"}}}'
read -r notified
read -r list
echo 'starting up...'
echo '{"jsonrpc":"2.0","method":"notifications/message","params":{}}'
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo","inputSchema":{}},{"name":"add","description":"Add","inputSchema":{}}]}}'
"#;

#[tokio::test]
async fn probe_lists_tool_names() {
    let (name, tools) = probe_tools(SCRIPTED_SERVER).await.unwrap();
    assert_eq!(name, "scripted");
    assert_eq!(tools, vec!["echo", "add"]);
}

#[tokio::test]
async fn rpc_errors_surface() {
    let script = r#"
read -r init
echo '{"jsonrpc":"2.0","id":1,"error":{"code":-32603,"message":"nope"}}'
"#;
    let mut client = StdioClient::spawn(script).unwrap();
    match client.initialize().await {
        Err(McpError::Rpc { code, message }) => {
            assert_eq!(code, -32603);
            assert_eq!(message, "nope");
        }
        other => panic!("expected rpc error, got {other:?}"),
    }
    client.shutdown().await;
}

#[tokio::test]
async fn early_exit_is_closed() {
    let mut client = StdioClient::spawn("exit 0").unwrap();
    let result = client.initialize().await;
    assert!(matches!(result, Err(McpError::Closed) | Err(McpError::Io(_))));
}
