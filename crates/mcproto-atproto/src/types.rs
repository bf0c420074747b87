//! Core XRPC request and response types.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for TID clock identifier to ensure uniqueness within a process.
static TID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A TID (timestamp-based ID) used as record keys.
///
/// Per ATProto spec: https://atproto.com/specs/record-key
/// TIDs are 13 characters of base32-sortable encoding containing:
/// - 53 bits of microsecond timestamp
/// - 10 bits of clock identifier (for collision prevention)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tid(pub String);

impl Tid {
    /// Generate a new TID based on current time with a unique clock identifier.
    pub fn now() -> Self {
        let micros = chrono::Utc::now().timestamp_micros().max(0) as u64;

        // Counter wraps at 1024 (10 bits)
        let clock_id = TID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0x3FF;

        Self::from_u64((micros << 10) | clock_id)
    }

    fn from_u64(val: u64) -> Self {
        // Base32-sortable encoding (uses digits 2-7 and a-z)
        const CHARSET: &[u8] = b"234567abcdefghijklmnopqrstuvwxyz";
        let mut tid = String::with_capacity(13);

        let mut v = val;
        for _ in 0..13 {
            tid.push(CHARSET[(v & 0x1f) as usize] as char);
            v >>= 5;
        }

        Self(tid.chars().rev().collect())
    }
}

impl std::fmt::Display for Tid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session information from authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    /// Absent when the session was resumed from a bare access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_jwt: Option<String>,
}

/// The identity half of a session, without tokens.
///
/// This is what registry operations receive: who is acting, not how
/// they authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub did: String,
    pub handle: String,
}

impl SessionInfo {
    pub fn new(did: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            handle: handle.into(),
        }
    }
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self::new(&session.did, &session.handle)
    }
}

/// Response from `com.atproto.server.getSession`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetSessionResponse {
    pub did: String,
    pub handle: String,
}

/// Response from creating or putting a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecordResponse {
    pub uri: String,
    pub cid: String,
}

/// Response from getting a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRecordResponse<T> {
    pub uri: String,
    pub cid: Option<String>,
    pub value: T,
}

/// Response from listing records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRecordsResponse<T> {
    pub records: Vec<ListRecordItem<T>>,
    pub cursor: Option<String>,
}

/// A single record in a list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRecordItem<T> {
    pub uri: String,
    pub cid: String,
    pub value: T,
}

/// Response from `app.bsky.feed.searchPosts`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPostsResponse {
    #[serde(default)]
    pub posts: Vec<PostView>,
    pub cursor: Option<String>,
}

/// The parts of a post view the registry uses.
#[derive(Debug, Clone, Deserialize)]
pub struct PostView {
    pub uri: String,
    pub cid: String,
    pub author: ProfileViewBasic,
}

/// Minimal author profile attached to search results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileViewBasic {
    pub did: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}
