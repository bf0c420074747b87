//! Attestations: third-party endorsements of a server.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use futures_util::future::join_all;
use mcproto_atproto::{
    ATTESTATION_COLLECTION, AtUri, CreateRecordResponse, RecordStore, SERVER_COLLECTION,
    SearchHit, SessionInfo, Tid,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{AttestationRecord, Publisher, RegistryError, Usage};

/// How many attestations are shown before the list is expanded.
pub const INITIAL_SHOW_COUNT: usize = 3;

/// An attestation together with who made it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttestationEntry {
    pub uri: String,
    pub cid: Option<String>,
    pub value: AttestationRecord,
    pub publisher: Publisher,
}

/// Attestations for `server_uri`: at most one per publisher, newest first.
///
/// The caller's own attestations are listed directly and a failure to do so
/// is an error. Other publishers' attestations come from search, fetched
/// concurrently; anything that fails to fetch or points at another server
/// is dropped.
pub async fn list_attestations(
    store: &dyn RecordStore,
    session: &SessionInfo,
    server_uri: &str,
    search_limit: u8,
) -> Result<Vec<AttestationEntry>, RegistryError> {
    let mut entries = Vec::new();

    for stored in store.list_records(&session.did, ATTESTATION_COLLECTION).await? {
        match serde_json::from_value::<AttestationRecord>(stored.value) {
            Ok(value) if value.server_uri == server_uri => entries.push(AttestationEntry {
                uri: stored.uri,
                cid: stored.cid,
                value,
                publisher: Publisher::from_session(session),
            }),
            Ok(_) => {}
            Err(e) => warn!(uri = %stored.uri, error = %e, "skipping unreadable attestation"),
        }
    }
    let owned = entries.len();

    let hits = match store.search(server_uri, search_limit).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(error = %e, server_uri, "attestation search failed");
            Vec::new()
        }
    };

    let mut seen = HashSet::new();
    let targets: Vec<(AtUri, SearchHit)> = hits
        .into_iter()
        .filter(|hit| hit.author.did != session.did)
        .filter_map(|hit| {
            let uri = AtUri::parse(&hit.uri).ok()?.in_collection(ATTESTATION_COLLECTION);
            seen.insert(uri.to_string()).then_some((uri, hit))
        })
        .collect();

    let fetched = join_all(
        targets
            .iter()
            .map(|(uri, hit)| fetch_attestation(store, uri, hit, server_uri)),
    )
    .await;
    entries.extend(fetched.into_iter().flatten());

    let entries = collapse_attestations(entries);
    debug!(
        server_uri,
        owned,
        total = entries.len(),
        "listed attestations"
    );
    Ok(entries)
}

async fn fetch_attestation(
    store: &dyn RecordStore,
    uri: &AtUri,
    hit: &SearchHit,
    server_uri: &str,
) -> Option<AttestationEntry> {
    let stored = match store.get_record(&uri.did, &uri.collection, &uri.rkey).await {
        Ok(stored) => stored,
        Err(e) => {
            warn!(uri = %uri, error = %e, "failed to fetch attestation");
            return None;
        }
    };

    let value: AttestationRecord = match serde_json::from_value(stored.value) {
        Ok(value) => value,
        Err(e) => {
            warn!(uri = %uri, error = %e, "skipping unreadable attestation");
            return None;
        }
    };
    if value.server_uri != server_uri {
        return None;
    }

    Some(AttestationEntry {
        uri: uri.to_string(),
        cid: stored.cid,
        value,
        publisher: Publisher::from_profile(&hit.author),
    })
}

/// Keep the latest attestation per publisher DID and sort newest first.
///
/// On equal timestamps the entry seen first wins.
pub fn collapse_attestations(entries: Vec<AttestationEntry>) -> Vec<AttestationEntry> {
    let mut latest: Vec<AttestationEntry> = Vec::new();
    let mut by_did: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        match by_did.get(&entry.publisher.did) {
            Some(&idx) => {
                if entry.value.timestamp > latest[idx].value.timestamp {
                    latest[idx] = entry;
                }
            }
            None => {
                by_did.insert(entry.publisher.did.clone(), latest.len());
                latest.push(entry);
            }
        }
    }

    latest.sort_by(|a, b| b.value.timestamp.cmp(&a.value.timestamp));
    latest
}

/// The slice of attestations to render, and the expand/collapse control.
#[derive(Debug, Clone, Copy)]
pub struct AttestationPreview<'a> {
    pub visible: &'a [AttestationEntry],
    total: usize,
    expanded: bool,
}

impl<'a> AttestationPreview<'a> {
    pub fn new(attestations: &'a [AttestationEntry], show_all: bool) -> Self {
        let shown = if show_all {
            attestations.len()
        } else {
            attestations.len().min(INITIAL_SHOW_COUNT)
        };
        Self {
            visible: &attestations[..shown],
            total: attestations.len(),
            expanded: show_all,
        }
    }

    /// How many attestations are not shown.
    pub fn hidden(&self) -> usize {
        self.total - self.visible.len()
    }

    /// Label for the toggle, or `None` when everything fits.
    pub fn toggle_label(&self) -> Option<String> {
        if self.total <= INITIAL_SHOW_COUNT {
            None
        } else if self.expanded {
            Some("Show less".to_string())
        } else {
            Some(format!("Show {} more", self.hidden()))
        }
    }
}

/// A new attestation, before it is timestamped and written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewAttestation {
    pub server_uri: String,
    pub rating: f64,
    pub comment: Option<String>,
    pub usage: Option<Usage>,
}

/// Write an attestation into the session's repository under a fresh TID.
pub async fn create_attestation(
    store: &dyn RecordStore,
    session: &SessionInfo,
    attestation: NewAttestation,
) -> Result<CreateRecordResponse, RegistryError> {
    if !(0.0..=1.0).contains(&attestation.rating) {
        return Err(RegistryError::Validation(format!(
            "rating must be between 0 and 1, got {}",
            attestation.rating
        )));
    }
    let server = AtUri::parse(&attestation.server_uri)?;
    if server.collection != SERVER_COLLECTION {
        warn!(uri = %server, "attesting a record outside {}", SERVER_COLLECTION);
    }

    let record = AttestationRecord {
        comment: attestation.comment,
        usage: attestation.usage,
        ..AttestationRecord::new(attestation.server_uri, attestation.rating, Utc::now())
    };
    let value = serde_json::to_value(&record).map_err(|e| RegistryError::Transport(e.into()))?;

    let rkey = Tid::now();
    let response = store
        .create_record(&session.did, ATTESTATION_COLLECTION, Some(&rkey.0), value)
        .await?;

    info!(uri = %response.uri, server_uri = %record.server_uri, "created attestation");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn entry(did: &str, secs: i64, rating: f64) -> AttestationEntry {
        AttestationEntry {
            uri: format!("at://{did}/app.mcp.server.attestation/{secs}"),
            cid: None,
            value: AttestationRecord::new(
                "at://did:plc:s/app.mcp.server/k",
                rating,
                Utc.timestamp_opt(secs, 0).unwrap(),
            ),
            publisher: Publisher::from_did(did),
        }
    }

    #[test]
    fn collapse_keeps_latest_per_publisher() {
        let out = collapse_attestations(vec![
            entry("did:plc:a", 10, 0.2),
            entry("did:plc:b", 5, 0.5),
            entry("did:plc:a", 20, 0.9),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].publisher.did, "did:plc:a");
        assert_eq!(out[0].value.rating, 0.9);
        assert_eq!(out[1].publisher.did, "did:plc:b");
    }

    #[test]
    fn collapse_tie_keeps_first_seen() {
        let out = collapse_attestations(vec![entry("did:plc:a", 10, 0.1), entry("did:plc:a", 10, 0.7)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value.rating, 0.1);
    }

    #[test]
    fn preview_of_five() {
        let list: Vec<_> = (0..5).map(|i| entry(&format!("did:plc:{i}"), i, 1.0)).collect();

        let collapsed = AttestationPreview::new(&list, false);
        assert_eq!(collapsed.visible.len(), 3);
        assert_eq!(collapsed.hidden(), 2);
        assert_eq!(collapsed.toggle_label().as_deref(), Some("Show 2 more"));

        let expanded = AttestationPreview::new(&list, true);
        assert_eq!(expanded.visible.len(), 5);
        assert_eq!(expanded.hidden(), 0);
        assert_eq!(expanded.toggle_label().as_deref(), Some("Show less"));
    }

    #[test]
    fn preview_without_overflow_has_no_toggle() {
        let list = vec![entry("did:plc:a", 1, 1.0)];
        let preview = AttestationPreview::new(&list, false);
        assert_eq!(preview.hidden(), 0);
        assert_eq!(preview.toggle_label(), None);
    }
}
