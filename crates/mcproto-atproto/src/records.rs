//! Record collection constants.

/// Lexicon NSID for MCP server descriptor records.
pub const SERVER_COLLECTION: &str = "app.mcp.server";

/// Lexicon NSID for MCP server attestation records.
pub const ATTESTATION_COLLECTION: &str = "app.mcp.server.attestation";

/// Bluesky post records (search results point at these).
pub const POST_COLLECTION: &str = "app.bsky.feed.post";
