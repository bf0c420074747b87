//! Property-based tests for merge and aggregation invariants.

use chrono::{DateTime, TimeZone, Utc};
use mcproto_atproto::SessionInfo;
use mcproto_registry::{
    AttestationEntry, AttestationPreview, AttestationRecord, INITIAL_SHOW_COUNT, Publisher,
    ServerRegistration, collapse_attestations, merge_registration, record_key,
};
use proptest::prelude::*;
use std::collections::HashSet;

// Strategy for tool names
fn tool_name() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,8}"
}

// Strategy for a small pool of publisher DIDs, so collisions happen
fn publisher_did() -> impl Strategy<Value = String> {
    (0u8..5).prop_map(|n| format!("did:plc:p{n}"))
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn attestation() -> impl Strategy<Value = AttestationEntry> {
    (publisher_did(), 0i64..1_000, 0.0..=1.0f64, "[a-z0-9]{6}").prop_map(
        |(did, secs, rating, rkey)| AttestationEntry {
            uri: format!("at://{did}/app.mcp.server.attestation/{rkey}"),
            cid: None,
            value: AttestationRecord::new("at://did:plc:s/app.mcp.server/k", rating, timestamp(secs)),
            publisher: Publisher::from_did(did),
        },
    )
}

proptest! {
    #[test]
    fn collapsed_attestations_are_sorted_and_unique(
        entries in prop::collection::vec(attestation(), 0..30),
    ) {
        let collapsed = collapse_attestations(entries.clone());

        for pair in collapsed.windows(2) {
            prop_assert!(pair[0].value.timestamp >= pair[1].value.timestamp);
        }

        let dids: HashSet<&str> = collapsed.iter().map(|a| a.publisher.did.as_str()).collect();
        prop_assert_eq!(dids.len(), collapsed.len());

        // every publisher keeps its newest timestamp
        for kept in &collapsed {
            let newest = entries
                .iter()
                .filter(|e| e.publisher.did == kept.publisher.did)
                .map(|e| e.value.timestamp)
                .max()
                .unwrap();
            prop_assert_eq!(kept.value.timestamp, newest);
        }

        let input_dids: HashSet<&str> = entries.iter().map(|a| a.publisher.did.as_str()).collect();
        prop_assert_eq!(input_dids, dids);
    }

    #[test]
    fn preview_never_hides_more_than_it_has(
        entries in prop::collection::vec(attestation(), 0..10),
        show_all in proptest::bool::ANY,
    ) {
        let preview = AttestationPreview::new(&entries, show_all);
        prop_assert_eq!(preview.visible.len() + preview.hidden(), entries.len());
        if !show_all {
            prop_assert!(preview.visible.len() <= INITIAL_SHOW_COUNT);
        }
    }

    #[test]
    fn merged_tools_are_a_deduplicated_superset(
        first in prop::collection::vec(tool_name(), 0..6),
        second in prop::collection::vec(tool_name(), 0..6),
        gap in -5i64..5,
    ) {
        let session = SessionInfo::new("did:plc:alice", "alice.test");
        let mut registration = ServerRegistration::new("uvx tool", "Tool");

        registration.tools = first.clone();
        let before = merge_registration(None, &registration, &session, timestamp(100));

        registration.tools = second.clone();
        let after = merge_registration(Some(&before), &registration, &session, timestamp(100 + gap));

        // previous order is a prefix
        prop_assert_eq!(&after.tools[..before.tools.len()], &before.tools[..]);
        for tool in first.iter().chain(&second) {
            prop_assert!(after.tools.contains(tool));
        }
        let unique: HashSet<&String> = after.tools.iter().collect();
        prop_assert_eq!(unique.len(), after.tools.len());

        prop_assert_eq!(after.created_at, before.created_at);
        prop_assert!(after.last_registered_at > before.last_registered_at);
    }

    #[test]
    fn record_keys_are_32_lowercase_hex(installation in ".{0,200}") {
        let key = record_key(&installation);
        prop_assert_eq!(key.len(), 32);
        prop_assert!(key.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }
}
