//! AT URI parsing utilities.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error when parsing an AT URI.
#[derive(Debug, Error)]
#[error("invalid AT URI: {0}")]
pub struct AtUriError(String);

/// A parsed AT Protocol URI.
///
/// AT URIs have the format: `at://{did}/{collection}/{rkey}`. The DID
/// segment names the repository owner, which is what ownership checks
/// compare against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtUri {
    /// The DID of the repository owner.
    pub did: String,
    /// The collection (e.g., "app.mcp.server").
    pub collection: String,
    /// The record key.
    pub rkey: String,
}

impl AtUri {
    /// Build a URI from its parts.
    pub fn new(
        did: impl Into<String>,
        collection: impl Into<String>,
        rkey: impl Into<String>,
    ) -> Self {
        Self {
            did: did.into(),
            collection: collection.into(),
            rkey: rkey.into(),
        }
    }

    /// Parse an AT URI string.
    ///
    /// # Example
    ///
    /// ```
    /// use mcproto_atproto::AtUri;
    ///
    /// let uri = AtUri::parse("at://did:plc:abc123/app.mcp.server/3abc").unwrap();
    /// assert_eq!(uri.did, "did:plc:abc123");
    /// assert_eq!(uri.collection, "app.mcp.server");
    /// assert_eq!(uri.rkey, "3abc");
    /// ```
    pub fn parse(uri: &str) -> Result<Self, AtUriError> {
        let rest = uri
            .strip_prefix("at://")
            .ok_or_else(|| AtUriError(format!("missing at:// prefix: {uri}")))?;

        let parts: Vec<&str> = rest.splitn(3, '/').collect();
        if parts.len() != 3 {
            return Err(AtUriError(format!("expected did/collection/rkey: {uri}")));
        }

        if parts[0].is_empty() || parts[1].is_empty() || parts[2].is_empty() {
            return Err(AtUriError(format!("empty component in URI: {uri}")));
        }

        if parts[2].contains('/') {
            return Err(AtUriError(format!("unexpected path after rkey: {uri}")));
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }

    /// The same repository and record key, addressed in another collection.
    ///
    /// Search results point at posts; the registry re-targets them at the
    /// record collection it actually wants to fetch.
    pub fn in_collection(&self, collection: &str) -> Self {
        Self::new(&self.did, collection, &self.rkey)
    }

    /// Quick rkey extraction without full parsing.
    ///
    /// # Example
    ///
    /// ```
    /// use mcproto_atproto::AtUri;
    ///
    /// assert_eq!(AtUri::extract_rkey("at://did/col/rkey123"), "rkey123");
    /// assert_eq!(AtUri::extract_rkey("no-slash"), "no-slash");
    /// ```
    pub fn extract_rkey(uri: &str) -> &str {
        uri.rsplit('/').next().unwrap_or("")
    }
}

impl FromStr for AtUri {
    type Err = AtUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}/{}/{}", self.did, self.collection, self.rkey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_uri() {
        let uri = AtUri::parse("at://did:plc:abc123/app.mcp.server/3abc").unwrap();
        assert_eq!(uri.did, "did:plc:abc123");
        assert_eq!(uri.collection, "app.mcp.server");
        assert_eq!(uri.rkey, "3abc");
    }

    #[test]
    fn test_parse_missing_prefix() {
        let result = AtUri::parse("did:plc:abc/collection/rkey");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("missing at:// prefix")
        );
    }

    #[test]
    fn test_parse_missing_rkey() {
        assert!(AtUri::parse("at://did:plc:abc/collection").is_err());
    }

    #[test]
    fn test_parse_empty_component() {
        let result = AtUri::parse("at://did:plc:abc//rkey");
        assert!(result.unwrap_err().to_string().contains("empty component"));
    }

    #[test]
    fn test_parse_rejects_trailing_path() {
        let result = AtUri::parse("at://did:plc:abc/app.mcp.server/key/attestations");
        assert!(result.is_err());
    }

    #[test]
    fn test_in_collection_keeps_repo_and_rkey() {
        let post = AtUri::parse("at://did:plc:abc/app.bsky.feed.post/3kxyz").unwrap();
        let server = post.in_collection("app.mcp.server");
        assert_eq!(server.to_string(), "at://did:plc:abc/app.mcp.server/3kxyz");
    }

    #[test]
    fn test_extract_rkey_trailing_slash() {
        assert_eq!(AtUri::extract_rkey("path/to/"), "");
    }

    #[test]
    fn test_roundtrip() {
        let original = "at://did:plc:abc123/app.mcp.server/0f9e1c2d";
        let parsed: AtUri = original.parse().unwrap();
        assert_eq!(parsed.to_string(), original);
    }
}
