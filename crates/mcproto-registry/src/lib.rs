//! Registry logic for MCP servers published as ATProto records.
//!
//! Every operation takes the [`RecordStore`](mcproto_atproto::RecordStore)
//! to talk to and the [`SessionInfo`](mcproto_atproto::SessionInfo) of the
//! identity acting, so nothing here holds a session of its own.
//!
//! - [`Registrar`] publishes or refreshes one server descriptor per installation.
//! - [`list_servers`] merges owned descriptors with search-discovered ones.
//! - [`list_attestations`] collects the latest attestation per publisher.
//! - [`delete_server`] refuses to touch records the caller does not own.

mod access;
mod attestations;
mod directory;
pub mod discovery;
mod error;
mod registration;
mod rkey;
mod schema;
pub mod source;

pub use access::{Authorization, authorize, delete_server};
pub use attestations::{
    AttestationEntry, AttestationPreview, INITIAL_SHOW_COUNT, NewAttestation, collapse_attestations,
    create_attestation, list_attestations,
};
pub use directory::{ServerEntry, SortKey, filter_servers, list_servers, sort_servers};
pub use error::RegistryError;
pub use registration::{RegistrationOutcome, Registrar, ServerRegistration, merge_registration};
pub use rkey::record_key;
pub use schema::{AttestationRecord, Publisher, ServerRecord, Usage, parse_timestamp};

/// Default number of search hits scanned per listing.
pub const DEFAULT_SEARCH_LIMIT: u8 = 100;
