//! API routes.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use mcproto_atproto::{RecordStore, SessionInfo};
use mcproto_registry::{
    AttestationEntry, RegistryError, ServerEntry, delete_server, list_attestations, list_servers,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::{ApiError, Authenticator};

/// Shared state for the API server.
pub struct AppState {
    pub auth: Arc<dyn Authenticator>,
    /// Store acting as the service identity.
    pub store: Arc<dyn RecordStore>,
    pub search_limit: u8,
}

/// Create the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/servers", get(get_servers))
        .route(
            "/servers/{*uri}",
            get(get_server_subresource).delete(delete_server_route),
        )
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_service_session,
        ))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Establish the service session before any handler runs.
///
/// Handlers read the resulting [`SessionInfo`] from request extensions.
async fn require_service_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.auth.service_session().await {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(e) => {
            warn!(error = %e, "service authentication failed");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Authentication failed" })),
            )
                .into_response()
        }
    }
}

async fn get_servers(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionInfo>,
) -> Result<Json<Vec<ServerEntry>>, ApiError> {
    let servers = list_servers(state.store.as_ref(), &session, state.search_limit).await?;
    Ok(Json(servers))
}

/// `GET /api/servers/{uri}/attestations`.
async fn get_server_subresource(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionInfo>,
    Path(path): Path<String>,
) -> Result<Json<Vec<AttestationEntry>>, ApiError> {
    let Some(server_uri) = path.strip_suffix("/attestations") else {
        return Err(RegistryError::NotFound(format!("no resource at {}", path)).into());
    };
    let server_uri = normalize_uri(server_uri);

    let attestations =
        list_attestations(state.store.as_ref(), &session, &server_uri, state.search_limit)
            .await?;
    Ok(Json(attestations))
}

/// `DELETE /api/servers/{uri}`.
///
/// Acts as the holder of the bearer token. Requests without one are
/// rejected before the URI is looked at.
async fn delete_server_route(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers)?.ok_or_else(|| {
        RegistryError::Authentication("a bearer token is required to delete records".to_string())
    })?;
    let uri = normalize_uri(&path);

    let acting = state.auth.resolve_token(token).await?;
    debug!(acting = %acting.info.did, uri = %uri, "delete requested");

    delete_server(acting.store.as_ref(), &acting.info, &uri).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest("malformed Authorization header".to_string()))
}

/// Undo path mangling of a raw `at://` URI.
///
/// Some clients and proxies collapse `//` in paths, leaving `at:/did:...`.
fn normalize_uri(raw: &str) -> String {
    let raw = raw.trim_start_matches('/');
    match raw.strip_prefix("at:") {
        Some(rest) if !rest.starts_with("//") => format!("at://{}", rest.trim_start_matches('/')),
        _ => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uri_forms() {
        let want = "at://did:plc:a/app.mcp.server/k";
        assert_eq!(normalize_uri(want), want);
        assert_eq!(normalize_uri("at:/did:plc:a/app.mcp.server/k"), want);
        assert_eq!(normalize_uri("/at://did:plc:a/app.mcp.server/k"), want);
        assert_eq!(normalize_uri("garbage"), "garbage");
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).unwrap().is_none());

        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), Some("abc"));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_err());
    }
}
