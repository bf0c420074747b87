//! ATProto XRPC client implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    AtprotoError, CreateRecordResponse, GetRecordResponse, GetSessionResponse, ListRecordItem,
    ListRecordsResponse, RecordStore, SearchHit, SearchPostsResponse, Session, SessionInfo,
    StoredRecord,
};

/// Initial attempt plus three retries.
const MAX_ATTEMPTS: u32 = 4;

/// Page size used when following listRecords cursors.
const LIST_PAGE_SIZE: u32 = 100;

/// Client for interacting with an ATProto PDS.
///
/// The session lives behind a shared lock so one client can be used from
/// many concurrent requests. A missing session is re-established lazily by
/// [`AtprotoClient::ensure_session`]; two requests racing to log in both
/// succeed and the last session written wins.
pub struct AtprotoClient {
    http: Client,
    pds_url: String,
    session: Arc<RwLock<Option<Session>>>,
}

impl AtprotoClient {
    /// Create a new client for the given PDS URL.
    pub fn new(pds_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            pds_url: pds_url.into().trim_end_matches('/').to_string(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Resume a session from a bare access token.
    ///
    /// The token is checked with `com.atproto.server.getSession`, which
    /// also tells us whose token it is. Resumed sessions cannot refresh.
    pub async fn resume(pds_url: impl Into<String>, access_jwt: &str) -> Result<Self, AtprotoError> {
        let client = Self::new(pds_url);
        let url = format!("{}/xrpc/com.atproto.server.getSession", client.pds_url);

        let response = client.http.get(&url).bearer_auth(access_jwt).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AtprotoError::Auth(format!(
                "session lookup failed ({}): {}",
                status, text
            )));
        }

        let info: GetSessionResponse = response.json().await?;
        debug!(did = %info.did, handle = %info.handle, "resumed session from access token");

        *client.session.write().await = Some(Session {
            did: info.did,
            handle: info.handle,
            access_jwt: access_jwt.to_string(),
            refresh_jwt: None,
        });
        Ok(client)
    }

    /// Authenticate with the PDS using identifier and password.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<SessionInfo, AtprotoError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            identifier: &'a str,
            password: &'a str,
        }

        let url = format!("{}/xrpc/com.atproto.server.createSession", self.pds_url);

        let response = self
            .http
            .post(&url)
            .json(&LoginRequest {
                identifier,
                password,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.map_err(|e| {
                AtprotoError::Auth(format!(
                    "login failed ({}): failed to read response: {}",
                    status, e
                ))
            })?;
            return Err(AtprotoError::Auth(format!(
                "login failed ({}): {}",
                status, text
            )));
        }

        let session: Session = response.json().await?;
        debug!(did = %session.did, handle = %session.handle, "authenticated with PDS");

        let info = SessionInfo::from(&session);
        *self.session.write().await = Some(session);
        Ok(info)
    }

    /// Return the current session, logging in first if there is none.
    pub async fn ensure_session(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SessionInfo, AtprotoError> {
        if let Some(info) = self.session_info().await {
            return Ok(info);
        }
        debug!(identifier, "no active session, re-authenticating");
        self.login(identifier, password).await
    }

    /// Drop the current session.
    pub async fn clear_session(&self) {
        *self.session.write().await = None;
    }

    /// Refresh the current session tokens.
    pub async fn refresh_session(&self) -> Result<(), AtprotoError> {
        let refresh_jwt = {
            let session = self.session.read().await;
            session
                .as_ref()
                .and_then(|s| s.refresh_jwt.clone())
                .ok_or_else(|| AtprotoError::Auth("no session to refresh".to_string()))?
        };

        let url = format!("{}/xrpc/com.atproto.server.refreshSession", self.pds_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&refresh_jwt)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AtprotoError::Auth(format!(
                "refresh failed ({}): {}",
                status, text
            )));
        }

        let session: Session = response.json().await?;
        debug!(did = %session.did, "refreshed session");

        *self.session.write().await = Some(session);
        Ok(())
    }

    /// Get the current session DID.
    pub async fn did(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.did.clone())
    }

    /// Get the current session identity.
    pub async fn session_info(&self) -> Option<SessionInfo> {
        self.session.read().await.as_ref().map(SessionInfo::from)
    }

    /// Get the PDS URL.
    pub fn pds_url(&self) -> &str {
        &self.pds_url
    }

    async fn access_token(&self) -> Result<String, AtprotoError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_jwt.clone())
            .ok_or_else(|| AtprotoError::Auth("not authenticated".to_string()))
    }

    async fn require_did(&self) -> Result<String, AtprotoError> {
        self.did()
            .await
            .ok_or_else(|| AtprotoError::Auth("not authenticated".to_string()))
    }

    /// Returns true if refresh succeeded.
    ///
    /// A session that cannot be refreshed is dropped so the next
    /// [`AtprotoClient::ensure_session`] logs in again.
    async fn try_refresh(&self) -> bool {
        match self.refresh_session().await {
            Ok(()) => {
                debug!("automatically refreshed expired session");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to auto-refresh session, dropping it");
                self.clear_session().await;
                false
            }
        }
    }

    /// Issue an authenticated XRPC call.
    ///
    /// An expired token is refreshed once per call and the call repeated
    /// without using up an attempt; transient upstream failures are retried
    /// with backoff (500ms, 1s, 2s).
    async fn xrpc<T: DeserializeOwned>(
        &self,
        method: Method,
        nsid: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T, AtprotoError> {
        let url = format!("{}/xrpc/{}", self.pds_url, nsid);

        let mut attempt = 0;
        let mut refreshed = false;
        loop {
            let token = self.access_token().await?;

            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let result = match request.send().await {
                Ok(response) => Self::handle_response(nsid, response).await,
                Err(e) => Err(AtprotoError::Http(e)),
            };

            match result {
                Ok(v) => return Ok(v),
                Err(ref e) if e.is_expired_token() && !refreshed => {
                    if self.try_refresh().await {
                        refreshed = true;
                        continue;
                    }
                    return result;
                }
                Err(ref e) if e.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                    let backoff_ms = 500 * (1u64 << attempt);
                    warn!(
                        nsid,
                        attempt = attempt + 1,
                        backoff_ms,
                        error = %e,
                        "transient XRPC error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                    continue;
                }
                Err(_) => return result,
            }
        }
    }

    /// Handle HTTP response and parse JSON.
    async fn handle_response<T: DeserializeOwned>(
        nsid: &str,
        response: reqwest::Response,
    ) -> Result<T, AtprotoError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(AtprotoError::RateLimited {
                endpoint: Some(nsid.to_string()),
                retry_after_secs,
            });
        }

        let text = response.text().await.map_err(|e| {
            AtprotoError::InvalidResponse(format!(
                "{} ({}): failed to read response: {}",
                nsid, status, e
            ))
        })?;

        if !status.is_success() {
            if let Ok(xrpc_error) = serde_json::from_str::<XrpcError>(&text) {
                return Err(AtprotoError::Xrpc {
                    error: xrpc_error.error,
                    message: xrpc_error.message,
                });
            }

            if status == StatusCode::NOT_FOUND {
                return Err(AtprotoError::Xrpc {
                    error: "NotFound".to_string(),
                    message: text,
                });
            }

            return Err(AtprotoError::InvalidResponse(format!(
                "{} failed ({}): {}",
                nsid, status, text
            )));
        }

        // deleteRecord answers with an empty body on some PDS versions
        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };
        Ok(serde_json::from_value(value)?)
    }

    /// List one page of records in a collection.
    pub async fn list_records<T: DeserializeOwned>(
        &self,
        repo: &str,
        collection: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<ListRecordsResponse<T>, AtprotoError> {
        let mut query = vec![
            ("repo", repo.to_string()),
            ("collection", collection.to_string()),
        ];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        self.xrpc(Method::GET, "com.atproto.repo.listRecords", &query, None)
            .await
    }

    /// List all records in a collection (handles pagination).
    pub async fn list_all_records<T: DeserializeOwned>(
        &self,
        repo: &str,
        collection: &str,
    ) -> Result<Vec<ListRecordItem<T>>, AtprotoError> {
        let mut all_records = Vec::new();
        let mut cursor = None;

        loop {
            let response: ListRecordsResponse<T> = self
                .list_records(repo, collection, Some(LIST_PAGE_SIZE), cursor.as_deref())
                .await?;

            let page_was_empty = response.records.is_empty();
            all_records.extend(response.records);

            if response.cursor.is_none() || page_was_empty {
                break;
            }
            cursor = response.cursor;
        }

        debug!(repo, collection, count = all_records.len(), "listed records");
        Ok(all_records)
    }

    /// Get a record by repository, collection and rkey.
    pub async fn get_record<T: DeserializeOwned>(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<GetRecordResponse<T>, AtprotoError> {
        let query = [
            ("repo", repo.to_string()),
            ("collection", collection.to_string()),
            ("rkey", rkey.to_string()),
        ];

        self.xrpc(Method::GET, "com.atproto.repo.getRecord", &query, None)
            .await
            .map_err(|e| not_found_as(e, collection, rkey))
    }

    /// Create a new record in the session's repository.
    pub async fn create_record<T: Serialize>(
        &self,
        collection: &str,
        rkey: Option<&str>,
        record: &T,
    ) -> Result<CreateRecordResponse, AtprotoError> {
        let did = self.require_did().await?;

        let mut body = serde_json::json!({
            "repo": did,
            "collection": collection,
            "record": typed_record(collection, record)?,
        });
        if let Some(rkey) = rkey {
            body["rkey"] = Value::String(rkey.to_string());
        }

        debug!(collection, rkey = ?rkey, "creating record");
        self.xrpc(Method::POST, "com.atproto.repo.createRecord", &[], Some(&body))
            .await
    }

    /// Create or replace (put) a record in the session's repository.
    pub async fn put_record<T: Serialize>(
        &self,
        collection: &str,
        rkey: &str,
        record: &T,
    ) -> Result<CreateRecordResponse, AtprotoError> {
        let did = self.require_did().await?;

        let body = serde_json::json!({
            "repo": did,
            "collection": collection,
            "rkey": rkey,
            "record": typed_record(collection, record)?,
        });

        debug!(collection, rkey, "putting record");
        self.xrpc(Method::POST, "com.atproto.repo.putRecord", &[], Some(&body))
            .await
    }

    /// Delete a record from the session's repository.
    pub async fn delete_record(&self, collection: &str, rkey: &str) -> Result<(), AtprotoError> {
        let did = self.require_did().await?;

        let body = serde_json::json!({
            "repo": did,
            "collection": collection,
            "rkey": rkey,
        });

        let _: Value = self
            .xrpc(Method::POST, "com.atproto.repo.deleteRecord", &[], Some(&body))
            .await
            .map_err(|e| not_found_as(e, collection, rkey))?;

        debug!(collection, rkey, "deleted record");
        Ok(())
    }

    /// Search posts through the PDS's appview proxy.
    pub async fn search_posts(
        &self,
        query: &str,
        limit: Option<u8>,
        cursor: Option<&str>,
    ) -> Result<SearchPostsResponse, AtprotoError> {
        let mut params = vec![("q", query.to_string())];
        if let Some(limit) = limit {
            params.push(("limit", limit.clamp(1, 100).to_string()));
        }
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }

        let response: SearchPostsResponse = self
            .xrpc(Method::GET, "app.bsky.feed.searchPosts", &params, None)
            .await?;

        debug!(query, count = response.posts.len(), "searched posts");
        Ok(response)
    }

    /// Writes go through the session's own repository only.
    async fn ensure_own_repo(&self, repo: &str) -> Result<(), AtprotoError> {
        let did = self.require_did().await?;
        if did != repo {
            return Err(AtprotoError::Auth(format!(
                "session for {} cannot write to repository {}",
                did, repo
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for AtprotoClient {
    async fn list_records(
        &self,
        repo: &str,
        collection: &str,
    ) -> Result<Vec<StoredRecord>, AtprotoError> {
        let items = self.list_all_records::<Value>(repo, collection).await?;
        Ok(items
            .into_iter()
            .map(|item| StoredRecord {
                uri: item.uri,
                cid: Some(item.cid),
                value: item.value,
            })
            .collect())
    }

    async fn get_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<StoredRecord, AtprotoError> {
        let record = AtprotoClient::get_record::<Value>(self, repo, collection, rkey).await?;
        Ok(StoredRecord {
            uri: record.uri,
            cid: record.cid,
            value: record.value,
        })
    }

    async fn put_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
        record: Value,
    ) -> Result<CreateRecordResponse, AtprotoError> {
        self.ensure_own_repo(repo).await?;
        AtprotoClient::put_record(self, collection, rkey, &record).await
    }

    async fn create_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: Option<&str>,
        record: Value,
    ) -> Result<CreateRecordResponse, AtprotoError> {
        self.ensure_own_repo(repo).await?;
        AtprotoClient::create_record(self, collection, rkey, &record).await
    }

    async fn delete_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<(), AtprotoError> {
        self.ensure_own_repo(repo).await?;
        AtprotoClient::delete_record(self, collection, rkey).await
    }

    async fn search(&self, query: &str, limit: u8) -> Result<Vec<SearchHit>, AtprotoError> {
        let response = self.search_posts(query, Some(limit), None).await?;
        Ok(response
            .posts
            .into_iter()
            .map(|post| SearchHit {
                uri: post.uri,
                cid: post.cid,
                author: post.author,
            })
            .collect())
    }
}

/// Serialize a record and stamp it with its `$type`.
///
/// ATProto records must include `$type` for lexicon validation.
fn typed_record<T: Serialize>(collection: &str, record: &T) -> Result<Value, AtprotoError> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(ref mut map) = value {
        map.insert("$type".to_string(), Value::String(collection.to_string()));
    }
    Ok(value)
}

fn not_found_as(err: AtprotoError, collection: &str, rkey: &str) -> AtprotoError {
    if err.is_not_found() {
        AtprotoError::NotFound {
            collection: collection.to_string(),
            rkey: rkey.to_string(),
        }
    } else {
        err
    }
}

/// XRPC error response format.
#[derive(Debug, Deserialize)]
struct XrpcError {
    error: String,
    #[serde(default)]
    message: String,
}
