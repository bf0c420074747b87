//! HTTP API tests against the in-memory record store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use mcproto_atproto::{AtUri, MemoryStore, RecordStore, SessionInfo};
use mcproto_registry::{Registrar, RegistryError, ServerRegistration};
use mcproto_web::{ActingSession, AppState, Authenticator, create_router};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Service identity is alice; bearer tokens map to other identities that
/// share the same store.
struct FakeAuth {
    service: SessionInfo,
    tokens: HashMap<String, SessionInfo>,
    store: Arc<MemoryStore>,
    offline: AtomicBool,
}

#[async_trait]
impl Authenticator for FakeAuth {
    async fn service_session(&self) -> Result<SessionInfo, RegistryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RegistryError::Authentication("PDS unreachable".into()));
        }
        Ok(self.service.clone())
    }

    async fn resolve_token(&self, token: &str) -> Result<ActingSession, RegistryError> {
        let info = self
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| RegistryError::Authentication("unknown token".into()))?;
        Ok(ActingSession {
            info,
            store: self.store.clone(),
        })
    }
}

struct Harness {
    router: Router,
    store: Arc<MemoryStore>,
    auth: Arc<FakeAuth>,
}

fn alice() -> SessionInfo {
    SessionInfo::new("did:plc:alice", "alice.test")
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(FakeAuth {
        service: alice(),
        tokens: HashMap::from([
            ("alice-token".to_string(), alice()),
            (
                "bob-token".to_string(),
                SessionInfo::new("did:plc:bob", "bob.test"),
            ),
        ]),
        store: store.clone(),
        offline: AtomicBool::new(false),
    });
    let state = Arc::new(AppState {
        auth: auth.clone(),
        store: store.clone(),
        search_limit: 100,
    });
    Harness {
        router: create_router(state),
        store,
        auth,
    }
}

async fn register_as(store: &MemoryStore, session: &SessionInfo, installation: &str) -> String {
    Registrar::new(store, session)
        .register(&ServerRegistration::new(installation, "Tool"))
        .await
        .unwrap()
        .unwrap()
        .uri
}

fn encode(uri: &str) -> String {
    uri.replace(':', "%3A").replace('/', "%2F")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn delete(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("DELETE").uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn listed_uris(router: &Router) -> Vec<String> {
    let (status, body) = send(router, get("/api/servers")).await;
    assert_eq!(status, StatusCode::OK);
    body.as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["uri"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness();
    let (status, body) = send(&h.router, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn service_auth_failure_is_401() {
    let h = harness();
    h.auth.offline.store(true, Ordering::SeqCst);

    for path in ["/api/servers", "/api/health"] {
        let (status, body) = send(&h.router, get(path)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Authentication failed" }));
    }
}

#[tokio::test]
async fn lists_own_and_discovered_servers() {
    let h = harness();
    let own = register_as(&h.store, &alice(), "github.com/alice/tool").await;
    let other = register_as(
        &h.store,
        &SessionInfo::new("did:plc:bob", "bob.test"),
        "github.com/bob/tool",
    )
    .await;

    let (status, body) = send(&h.router, get("/api/servers")).await;
    assert_eq!(status, StatusCode::OK);

    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["uri"], own.as_str());
    assert_eq!(entries[1]["uri"], other.as_str());
    assert_eq!(entries[0]["value"]["installation"], "github.com/alice/tool");
    assert_eq!(entries[0]["value"]["publisher"]["did"], "did:plc:alice");
}

#[tokio::test]
async fn non_owner_delete_is_forbidden_and_record_survives() {
    let h = harness();
    let uri = register_as(&h.store, &alice(), "github.com/alice/tool").await;

    let path = format!("/api/servers/{}", encode(&uri));
    let (status, body) = send(&h.router, delete(&path, Some("bob-token"))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("did:plc:bob"));
    assert_eq!(listed_uris(&h.router).await, vec![uri.clone()]);
    assert!(h.store.get(&AtUri::parse(&uri).unwrap()).await.is_some());
}

#[tokio::test]
async fn owner_delete_removes_record() {
    let h = harness();
    let uri = register_as(&h.store, &alice(), "github.com/alice/tool").await;

    let path = format!("/api/servers/{}", encode(&uri));
    let (status, body) = send(&h.router, delete(&path, Some("alice-token"))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    assert!(listed_uris(&h.router).await.is_empty());

    let (status, _) = send(&h.router, delete(&path, Some("alice-token"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_without_token_is_rejected() {
    let h = harness();
    let uri = register_as(&h.store, &alice(), "github.com/alice/tool").await;

    for path in [
        format!("/api/servers/{}", encode(&uri)),
        format!("/api/servers/{}", uri),
    ] {
        let (status, body) = send(&h.router, delete(&path, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("bearer token"));
    }

    assert_eq!(listed_uris(&h.router).await, vec![uri.clone()]);
    assert!(h.store.get(&AtUri::parse(&uri).unwrap()).await.is_some());
    assert_eq!(h.store.write_count(), 1);
}

#[tokio::test]
async fn delete_accepts_collapsed_raw_uri() {
    let h = harness();
    let uri = register_as(&h.store, &alice(), "github.com/alice/tool").await;

    // Unencoded, with the double slash collapsed the way some proxies do
    let path = format!("/api/servers/{}", uri.replacen("at://", "at:/", 1));
    let (status, _) = send(&h.router, delete(&path, Some("alice-token"))).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(
        h.store
            .list_records("did:plc:alice", "app.mcp.server")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn delete_error_statuses() {
    let h = harness();

    let (status, _) = send(&h.router, delete("/api/servers/not-a-uri", Some("alice-token"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let path = format!(
        "/api/servers/{}",
        encode("at://did:plc:alice/app.mcp.server/missing")
    );
    let (status, _) = send(&h.router, delete(&path, Some("stranger-token"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let path = format!(
        "/api/servers/{}",
        encode("at://did:plc:alice/app.bsky.feed.post/abc")
    );
    let (status, _) = send(&h.router, delete(&path, Some("alice-token"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn attestations_endpoint_collapses_per_publisher() {
    let h = harness();
    let server = register_as(&h.store, &alice(), "github.com/alice/tool").await;

    for (did, rkey, ts, rating) in [
        ("did:plc:bob", "3a", "2025-01-01T00:00:00Z", 0.2),
        ("did:plc:bob", "3b", "2025-02-01T00:00:00Z", 0.9),
        ("did:plc:carol", "3c", "2025-01-15T00:00:00Z", 1.0),
    ] {
        h.store
            .insert(
                &AtUri::new(did, "app.mcp.server.attestation", rkey),
                json!({
                    "$type": "app.mcp.server.attestation",
                    "serverUri": server,
                    "rating": rating,
                    "timestamp": ts,
                }),
            )
            .await;
    }

    let path = format!("/api/servers/{}/attestations", encode(&server));
    let (status, body) = send(&h.router, get(&path)).await;
    assert_eq!(status, StatusCode::OK);

    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["publisher"]["did"], "did:plc:bob");
    assert_eq!(entries[0]["value"]["rating"], 0.9);
    assert_eq!(entries[1]["publisher"]["did"], "did:plc:carol");
}

#[tokio::test]
async fn unknown_server_subresource_is_404() {
    let h = harness();
    let path = format!(
        "/api/servers/{}/reviews",
        encode("at://did:plc:alice/app.mcp.server/k")
    );
    let (status, _) = send(&h.router, get(&path)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
