//! The server directory: owned descriptors plus whatever search turns up.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use mcproto_atproto::{AtUri, RecordStore, SERVER_COLLECTION, SessionInfo};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{RegistryError, ServerRecord};

/// A descriptor and the URI it was read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerEntry {
    pub uri: String,
    pub value: ServerRecord,
}

/// List every server visible to `session`.
///
/// The caller's own descriptors come first and a failure to list them is
/// an error. Search is the only way to see other publishers' records; it
/// lags and may miss records entirely, so a failed search or a failed
/// fetch of one hit only costs those entries.
pub async fn list_servers(
    store: &dyn RecordStore,
    session: &SessionInfo,
    search_limit: u8,
) -> Result<Vec<ServerEntry>, RegistryError> {
    let mut seen = HashSet::new();
    let mut servers = Vec::new();

    for stored in store.list_records(&session.did, SERVER_COLLECTION).await? {
        if !seen.insert(stored.uri.clone()) {
            continue;
        }
        match ServerRecord::from_stored(&stored.uri, stored.value) {
            Ok(value) => servers.push(ServerEntry {
                uri: stored.uri,
                value,
            }),
            Err(e) => warn!(uri = %stored.uri, error = %e, "skipping unreadable descriptor"),
        }
    }
    let owned = servers.len();

    let query = format!("type:{}", SERVER_COLLECTION);
    let hits = match store.search(&query, search_limit).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(error = %e, "server search failed, listing owned records only");
            Vec::new()
        }
    };

    for hit in hits {
        let uri = match AtUri::parse(&hit.uri) {
            Ok(uri) => uri.in_collection(SERVER_COLLECTION),
            Err(e) => {
                debug!(uri = %hit.uri, error = %e, "ignoring search hit");
                continue;
            }
        };
        if !seen.insert(uri.to_string()) {
            continue;
        }

        let stored = match store.get_record(&uri.did, &uri.collection, &uri.rkey).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(uri = %uri, error = %e, "failed to fetch discovered descriptor");
                continue;
            }
        };
        match ServerRecord::from_stored(&stored.uri, stored.value) {
            Ok(value) => servers.push(ServerEntry {
                uri: uri.to_string(),
                value,
            }),
            Err(e) => warn!(uri = %uri, error = %e, "skipping unreadable descriptor"),
        }
    }

    debug!(owned, discovered = servers.len() - owned, "listed servers");
    Ok(servers)
}

/// Orderings offered when browsing the directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Most recently registered first.
    #[default]
    LastActive,
    /// First published first.
    Oldest,
    /// Alphabetical, ignoring case.
    Name,
}

impl FromStr for SortKey {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-active" => Ok(SortKey::LastActive),
            "oldest" => Ok(SortKey::Oldest),
            "name" => Ok(SortKey::Name),
            other => Err(RegistryError::Validation(format!(
                "unknown sort key '{}' (expected last-active, oldest or name)",
                other
            ))),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortKey::LastActive => "last-active",
            SortKey::Oldest => "oldest",
            SortKey::Name => "name",
        })
    }
}

/// Sort in place. Ties keep their listing order.
pub fn sort_servers(servers: &mut [ServerEntry], key: SortKey) {
    match key {
        SortKey::LastActive => {
            servers.sort_by(|a, b| b.value.last_registered_at.cmp(&a.value.last_registered_at))
        }
        SortKey::Oldest => servers.sort_by(|a, b| a.value.created_at.cmp(&b.value.created_at)),
        SortKey::Name => servers.sort_by_cached_key(|s| s.value.name.to_lowercase()),
    }
}

/// Keep servers whose name, description, publisher handle or tools
/// contain `query`, ignoring case. An empty query keeps everything.
pub fn filter_servers(servers: Vec<ServerEntry>, query: &str) -> Vec<ServerEntry> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return servers;
    }

    let hit = |s: &str| s.to_lowercase().contains(&needle);
    servers
        .into_iter()
        .filter(|s| {
            let v = &s.value;
            hit(&v.name)
                || v.description.as_deref().is_some_and(hit)
                || v.publisher.handle.as_deref().is_some_and(hit)
                || v.tools.iter().any(|t| hit(t))
        })
        .collect()
}
