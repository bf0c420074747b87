//! Error types for the ATProto client.

use thiserror::Error;

/// Errors that can occur when interacting with ATProto.
#[derive(Debug, Error)]
pub enum AtprotoError {
    /// Authentication failed or no session is available.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record not found.
    #[error("record not found: {collection}/{rkey}")]
    NotFound { collection: String, rkey: String },

    /// Invalid response from server.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limited.
    #[error("rate limited{}", match (endpoint, retry_after_secs) {
        (Some(ep), Some(secs)) => format!(" on {} (retry after {}s)", ep, secs),
        (Some(ep), None) => format!(" on {}", ep),
        (None, Some(secs)) => format!(" (retry after {}s)", secs),
        (None, None) => String::new(),
    })]
    RateLimited {
        /// The endpoint that was rate limited (optional).
        endpoint: Option<String>,
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },

    /// XRPC error from server.
    #[error("XRPC error: {error} - {message}")]
    Xrpc { error: String, message: String },
}

impl AtprotoError {
    /// Whether this error means the requested record does not exist.
    ///
    /// PDS implementations disagree on how a missing record is reported:
    /// some answer 404, others 400 with `RecordNotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            AtprotoError::NotFound { .. } => true,
            AtprotoError::Xrpc { error, .. } => error == "RecordNotFound" || error == "NotFound",
            _ => false,
        }
    }

    /// Whether this error indicates an expired access token.
    pub(crate) fn is_expired_token(&self) -> bool {
        matches!(self, AtprotoError::Xrpc { error, .. } if error == "ExpiredToken")
    }

    /// Whether this error is transient and worth retrying.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            AtprotoError::Xrpc { error, .. } => {
                error == "UpstreamFailure"
                    || error == "UpstreamTimeout"
                    || error == "InternalServerError"
                    || error == "ServiceUnavailable"
            }
            AtprotoError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_not_found_xrpc_counts_as_not_found() {
        let err = AtprotoError::Xrpc {
            error: "RecordNotFound".to_string(),
            message: "Could not locate record".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn upstream_failure_is_transient() {
        let err = AtprotoError::Xrpc {
            error: "UpstreamFailure".to_string(),
            message: String::new(),
        };
        assert!(err.is_transient());
        assert!(!err.is_not_found());
    }

    #[test]
    fn rate_limited_display() {
        let err = AtprotoError::RateLimited {
            endpoint: Some("app.bsky.feed.searchPosts".to_string()),
            retry_after_secs: Some(30),
        };
        assert_eq!(
            err.to_string(),
            "rate limited on app.bsky.feed.searchPosts (retry after 30s)"
        );
    }
}
