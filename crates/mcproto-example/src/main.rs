//! Example MCP server with `echo` and `add` tools.
//!
//! Speaks MCP over stdio. When account credentials are configured it
//! publishes its descriptor before serving; a failed registration is
//! logged and the server starts anyway.

use std::collections::HashMap;

use clap::Parser;
use mcproto_atproto::AtprotoClient;
use mcproto_mcp::{
    McpServer, ToolRegistry,
    protocol::{CallToolResult, ToolDefinition},
};
use mcproto_registry::{Registrar, ServerRegistration};
use miette::Result;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVER_NAME: &str = "mcproto-example";

#[derive(Parser)]
#[command(name = "mcproto-example")]
#[command(about = "Example MCP server that registers itself", long_about = None)]
struct Cli {
    /// PDS URL
    #[arg(long, env = "MCPROTO_PDS_URL", default_value = "https://bsky.social")]
    pds_url: String,

    /// Account handle; registration is skipped without it
    #[arg(long, env = "BSKY_HANDLE")]
    handle: Option<String>,

    /// App password
    #[arg(long, env = "BSKY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// How clients install this server
    #[arg(
        long,
        env = "MCPROTO_INSTALLATION",
        default_value = "https://github.com/zzstoatzz/mcproto/tree/main/crates/mcproto-example"
    )]
    installation: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Stdout carries the protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mcproto_example=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let tools = tools();

    match (&cli.handle, &cli.password) {
        (Some(handle), Some(password)) => {
            register_self(&cli.pds_url, handle, password, &cli.installation, &tools).await
        }
        _ => info!("BSKY_HANDLE/BSKY_PASSWORD not set, skipping registration"),
    }

    let mut server = McpServer::new(SERVER_NAME, env!("CARGO_PKG_VERSION"), tools);
    server.run().await.map_err(|e| miette::miette!("{}", e))?;

    Ok(())
}

/// Publish this server's descriptor. Never fails the process.
async fn register_self(
    pds_url: &str,
    handle: &str,
    password: &str,
    installation: &str,
    tools: &ToolRegistry,
) {
    let client = AtprotoClient::new(pds_url);
    let session = match client.login(handle, password).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "login failed, serving without registering");
            return;
        }
    };

    let registration = ServerRegistration {
        description: Some("Echoes messages and adds numbers".to_string()),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        tools: tools.tool_names(),
        language: Some("rust".to_string()),
        ..ServerRegistration::new(installation, SERVER_NAME)
    };

    if let Ok(Some(outcome)) = Registrar::new(&client, &session)
        .raise_on_error(false)
        .register(&registration)
        .await
    {
        info!(uri = %outcome.uri, created = outcome.created, "registered");
    }
}

fn tools() -> ToolRegistry {
    ToolRegistry::new()
        .register(
            ToolDefinition {
                name: "echo".to_string(),
                description: "Echo a message back".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }),
            },
            echo,
        )
        .register(
            ToolDefinition {
                name: "add".to_string(),
                description: "Add two numbers".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "a": { "type": "number" },
                        "b": { "type": "number" }
                    },
                    "required": ["a", "b"]
                }),
            },
            add,
        )
}

fn echo(args: &HashMap<String, Value>) -> CallToolResult {
    match args.get("message").and_then(Value::as_str) {
        Some(message) => CallToolResult::success(message),
        None => CallToolResult::error("Missing required parameter: message"),
    }
}

fn add(args: &HashMap<String, Value>) -> CallToolResult {
    let number = |key: &str| args.get(key).and_then(Value::as_f64);
    match (number("a"), number("b")) {
        (Some(a), Some(b)) => CallToolResult::success((a + b).to_string()),
        _ => CallToolResult::error("Parameters a and b must be numbers"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(value: Value) -> HashMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    fn text(result: &CallToolResult) -> Value {
        serde_json::to_value(result).unwrap()["content"][0]["text"].clone()
    }

    #[test]
    fn advertises_echo_and_add() {
        assert_eq!(tools().tool_names(), vec!["echo", "add"]);
    }

    #[test]
    fn echo_returns_message() {
        let result = tools().execute("echo", &args(json!({"message": "hello"})));
        assert_eq!(result, CallToolResult::success("hello"));
    }

    #[test]
    fn add_sums() {
        let registry = tools();
        assert_eq!(text(&registry.execute("add", &args(json!({"a": 2, "b": 3})))), "5");
        assert_eq!(
            text(&registry.execute("add", &args(json!({"a": 0.5, "b": 0.25})))),
            "0.75"
        );
    }

    #[test]
    fn bad_arguments_are_tool_errors() {
        let registry = tools();
        let bad_add = registry.execute("add", &args(json!({"a": "x", "b": 1})));
        assert_eq!(bad_add.is_error, Some(true));
        let bad_echo = registry.execute("echo", &args(json!({})));
        assert_eq!(bad_echo.is_error, Some(true));
    }
}
