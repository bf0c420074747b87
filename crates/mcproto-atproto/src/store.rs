//! The record store seam between registry logic and a PDS.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AtprotoError, CreateRecordResponse, ProfileViewBasic};

/// A record as returned by a list or get call, still untyped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    pub uri: String,
    pub cid: Option<String>,
    pub value: Value,
}

/// One result from the search index.
///
/// Search results carry only a partial projection of the record; callers
/// fetch the full record by repository, collection and key.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub uri: String,
    pub cid: String,
    pub author: ProfileViewBasic,
}

/// Remote record operations the registry depends on.
///
/// Reads take an explicit `repo` so other identities' records can be
/// fetched. Writes name the repo too; implementations backed by a single
/// authenticated session reject writes to any repo but their own.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// List every record of `collection` in `repo`, following cursors.
    async fn list_records(
        &self,
        repo: &str,
        collection: &str,
    ) -> Result<Vec<StoredRecord>, AtprotoError>;

    /// Fetch one record.
    async fn get_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<StoredRecord, AtprotoError>;

    /// Create or replace the record at `rkey`.
    async fn put_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
        record: Value,
    ) -> Result<CreateRecordResponse, AtprotoError>;

    /// Create a new record, letting the PDS assign a key when `rkey` is `None`.
    async fn create_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: Option<&str>,
        record: Value,
    ) -> Result<CreateRecordResponse, AtprotoError>;

    /// Delete a record.
    async fn delete_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<(), AtprotoError>;

    /// Full-text search. Best effort: results may lag or be incomplete.
    async fn search(&self, query: &str, limit: u8) -> Result<Vec<SearchHit>, AtprotoError>;
}
