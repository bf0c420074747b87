//! MCP (Model Context Protocol) plumbing for mcproto.
//!
//! A line-delimited JSON-RPC server over stdin/stdout for small tool
//! servers, and a client that launches a server command and asks it which
//! tools it provides.

pub mod client;
pub mod protocol;
pub mod server;
pub mod tools;

pub use client::{StdioClient, probe_tools};
pub use server::{McpError, McpServer};
pub use tools::ToolRegistry;

/// Protocol revision spoken by both ends.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
