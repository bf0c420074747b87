//! In-memory record store for tests and offline use.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{
    AtUri, AtprotoError, CreateRecordResponse, POST_COLLECTION, ProfileViewBasic, RecordStore,
    SearchHit, StoredRecord, Tid,
};

#[derive(Default)]
struct Inner {
    /// Keyed by full AT URI so iteration order is stable.
    records: BTreeMap<String, (String, Value)>,
    handles: HashMap<String, String>,
    hidden_from_search: HashSet<String>,
    failing_fetches: HashSet<String>,
    failing_listings: HashSet<String>,
    search_fails: bool,
}

/// A [`RecordStore`] that keeps every repository in one map.
///
/// Search mimics the appview: a `type:NSID` query matches records whose
/// `$type` equals the NSID, anything else is a substring match over the
/// record JSON. Hits point at `app.bsky.feed.post` URIs, like real search
/// results do. Writes are accepted for any repo.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    writes: AtomicUsize,
    next_cid: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle for a DID; search hits report it.
    pub async fn with_handle(self, did: &str, handle: &str) -> Self {
        self.inner
            .write()
            .await
            .handles
            .insert(did.to_string(), handle.to_string());
        self
    }

    /// Store a record verbatim, without counting it as a write.
    pub async fn insert(&self, uri: &AtUri, value: Value) {
        let cid = self.next_cid();
        self.inner
            .write()
            .await
            .records
            .insert(uri.to_string(), (cid, value));
    }

    /// Current value at `uri`, if any.
    pub async fn get(&self, uri: &AtUri) -> Option<Value> {
        self.inner
            .read()
            .await
            .records
            .get(&uri.to_string())
            .map(|(_, v)| v.clone())
    }

    /// Number of put/create/delete calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Keep a record out of search results, as if not yet indexed.
    pub async fn hide_from_search(&self, uri: &AtUri) {
        self.inner
            .write()
            .await
            .hidden_from_search
            .insert(uri.to_string());
    }

    /// Make fetches of `uri` fail.
    pub async fn fail_fetch(&self, uri: &AtUri) {
        self.inner
            .write()
            .await
            .failing_fetches
            .insert(uri.to_string());
    }

    /// Make listings of any collection in `repo` fail.
    pub async fn fail_listing(&self, repo: &str) {
        self.inner
            .write()
            .await
            .failing_listings
            .insert(repo.to_string());
    }

    /// Make every search fail.
    pub async fn fail_search(&self) {
        self.inner.write().await.search_fails = true;
    }

    fn next_cid(&self) -> String {
        format!("bafy{}", self.next_cid.fetch_add(1, Ordering::SeqCst))
    }
}

fn injected(what: &str) -> AtprotoError {
    AtprotoError::Xrpc {
        error: "InternalServerError".to_string(),
        message: format!("injected {what} failure"),
    }
}

fn matches_query(query: &str, value: &Value) -> bool {
    match query.strip_prefix("type:") {
        Some(nsid) => value.get("$type").and_then(Value::as_str) == Some(nsid),
        None => value.to_string().contains(query),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_records(
        &self,
        repo: &str,
        collection: &str,
    ) -> Result<Vec<StoredRecord>, AtprotoError> {
        let inner = self.inner.read().await;
        if inner.failing_listings.contains(repo) {
            return Err(injected("listing"));
        }

        let prefix = format!("at://{repo}/{collection}/");
        Ok(inner
            .records
            .iter()
            .filter(|(uri, _)| uri.starts_with(&prefix))
            .map(|(uri, (cid, value))| StoredRecord {
                uri: uri.clone(),
                cid: Some(cid.clone()),
                value: value.clone(),
            })
            .collect())
    }

    async fn get_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<StoredRecord, AtprotoError> {
        let uri = AtUri::new(repo, collection, rkey).to_string();
        let inner = self.inner.read().await;
        if inner.failing_fetches.contains(&uri) {
            return Err(injected("fetch"));
        }

        inner
            .records
            .get(&uri)
            .map(|(cid, value)| StoredRecord {
                uri: uri.clone(),
                cid: Some(cid.clone()),
                value: value.clone(),
            })
            .ok_or_else(|| AtprotoError::NotFound {
                collection: collection.to_string(),
                rkey: rkey.to_string(),
            })
    }

    async fn put_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
        mut record: Value,
    ) -> Result<CreateRecordResponse, AtprotoError> {
        if let Value::Object(ref mut map) = record {
            map.insert("$type".to_string(), Value::String(collection.to_string()));
        }

        let uri = AtUri::new(repo, collection, rkey).to_string();
        let cid = self.next_cid();
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner
            .write()
            .await
            .records
            .insert(uri.clone(), (cid.clone(), record));

        Ok(CreateRecordResponse { uri, cid })
    }

    async fn create_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: Option<&str>,
        record: Value,
    ) -> Result<CreateRecordResponse, AtprotoError> {
        let rkey = rkey.map(str::to_string).unwrap_or_else(|| Tid::now().0);
        let uri = AtUri::new(repo, collection, &rkey).to_string();
        if self.inner.read().await.records.contains_key(&uri) {
            return Err(AtprotoError::Xrpc {
                error: "InvalidRequest".to_string(),
                message: format!("record already exists: {uri}"),
            });
        }
        self.put_record(repo, collection, &rkey, record).await
    }

    async fn delete_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<(), AtprotoError> {
        let uri = AtUri::new(repo, collection, rkey).to_string();
        self.writes.fetch_add(1, Ordering::SeqCst);
        match self.inner.write().await.records.remove(&uri) {
            Some(_) => Ok(()),
            None => Err(AtprotoError::NotFound {
                collection: collection.to_string(),
                rkey: rkey.to_string(),
            }),
        }
    }

    async fn search(&self, query: &str, limit: u8) -> Result<Vec<SearchHit>, AtprotoError> {
        let inner = self.inner.read().await;
        if inner.search_fails {
            return Err(injected("search"));
        }

        let hits = inner
            .records
            .iter()
            .filter(|(uri, _)| !inner.hidden_from_search.contains(*uri))
            .filter(|(_, (_, value))| matches_query(query, value))
            .filter_map(|(uri, (cid, _))| {
                let uri = AtUri::parse(uri).ok()?;
                Some(SearchHit {
                    uri: uri.in_collection(POST_COLLECTION).to_string(),
                    cid: cid.clone(),
                    author: ProfileViewBasic {
                        handle: inner.handles.get(&uri.did).cloned(),
                        did: uri.did,
                        display_name: None,
                    },
                })
            })
            .take(limit as usize)
            .collect();

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_counts_one_write() {
        let store = MemoryStore::new();
        let resp = store
            .put_record("did:plc:a", "app.mcp.server", "k1", json!({"name": "x"}))
            .await
            .unwrap();
        assert_eq!(resp.uri, "at://did:plc:a/app.mcp.server/k1");

        let record = store.get_record("did:plc:a", "app.mcp.server", "k1").await.unwrap();
        assert_eq!(record.value["$type"], "app.mcp.server");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn listing_does_not_leak_sibling_collections() {
        let store = MemoryStore::new();
        store
            .put_record("did:plc:a", "app.mcp.server", "k1", json!({}))
            .await
            .unwrap();
        store
            .put_record("did:plc:a", "app.mcp.server.attestation", "t1", json!({}))
            .await
            .unwrap();

        let servers = store.list_records("did:plc:a", "app.mcp.server").await.unwrap();
        assert_eq!(servers.len(), 1);
    }

    #[tokio::test]
    async fn search_by_type_returns_post_uris() {
        let store = MemoryStore::new().with_handle("did:plc:a", "a.test").await;
        store
            .put_record("did:plc:a", "app.mcp.server", "k1", json!({}))
            .await
            .unwrap();

        let hits = store.search("type:app.mcp.server", 100).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uri, "at://did:plc:a/app.bsky.feed.post/k1");
        assert_eq!(hits[0].author.handle.as_deref(), Some("a.test"));
    }

    #[tokio::test]
    async fn hidden_records_are_not_searchable() {
        let store = MemoryStore::new();
        let uri = AtUri::new("did:plc:a", "app.mcp.server", "k1");
        store.insert(&uri, json!({"$type": "app.mcp.server"})).await;
        store.hide_from_search(&uri).await;

        assert!(store.search("type:app.mcp.server", 100).await.unwrap().is_empty());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .delete_record("did:plc:a", "app.mcp.server", "missing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
