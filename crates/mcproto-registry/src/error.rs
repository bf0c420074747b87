//! Error types for registry operations.

use mcproto_atproto::{AtUriError, AtprotoError};
use thiserror::Error;

/// Errors returned by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No usable session, or the credentials were rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The acting identity does not own the record.
    #[error("{acting} cannot modify a record owned by {owner}")]
    Authorization { acting: String, owner: String },

    /// The record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Input rejected before any remote call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Network, server or decoding failure.
    #[error(transparent)]
    Transport(AtprotoError),
}

impl From<AtprotoError> for RegistryError {
    fn from(err: AtprotoError) -> Self {
        match err {
            AtprotoError::Auth(msg) => RegistryError::Authentication(msg),
            AtprotoError::NotFound { collection, rkey } => {
                RegistryError::NotFound(format!("{}/{}", collection, rkey))
            }
            other if other.is_not_found() => RegistryError::NotFound(other.to_string()),
            other => RegistryError::Transport(other),
        }
    }
}

impl From<AtUriError> for RegistryError {
    fn from(err: AtUriError) -> Self {
        RegistryError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atproto_errors_map_onto_taxonomy() {
        let auth: RegistryError = AtprotoError::Auth("bad password".into()).into();
        assert!(matches!(auth, RegistryError::Authentication(_)));

        let missing: RegistryError = AtprotoError::NotFound {
            collection: "app.mcp.server".into(),
            rkey: "abc".into(),
        }
        .into();
        assert_eq!(missing.to_string(), "not found: app.mcp.server/abc");

        let upstream: RegistryError = AtprotoError::Xrpc {
            error: "UpstreamFailure".into(),
            message: String::new(),
        }
        .into();
        assert!(matches!(upstream, RegistryError::Transport(_)));
    }
}
