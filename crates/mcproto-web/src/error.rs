//! Error types for the HTTP API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mcproto_registry::RegistryError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Malformed request.
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Registry(RegistryError::Authentication(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Registry(RegistryError::Authorization { .. }) => StatusCode::FORBIDDEN,
            ApiError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Registry(RegistryError::Validation(_)) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Registry(RegistryError::Transport(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcproto_atproto::AtprotoError;

    #[test]
    fn status_mapping() {
        let cases = [
            (RegistryError::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (
                RegistryError::Authorization {
                    acting: "did:plc:a".into(),
                    owner: "did:plc:b".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (RegistryError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (RegistryError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                RegistryError::Transport(AtprotoError::InvalidResponse("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
