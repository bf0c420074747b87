//! ATProto XRPC client for the mcproto registry.
//!
//! This crate provides a client for interacting with an ATProto PDS:
//! session management, record CRUD, and post search. The registry logic
//! talks to it through the [`RecordStore`] trait so it can be exercised
//! against an in-memory store (feature `memory`).

mod client;
mod error;
#[cfg(feature = "memory")]
mod memory;
mod records;
mod store;
mod types;
mod uri;

pub use client::AtprotoClient;
pub use error::AtprotoError;
#[cfg(feature = "memory")]
pub use memory::MemoryStore;
pub use records::*;
pub use store::{RecordStore, SearchHit, StoredRecord};
pub use types::*;
pub use uri::{AtUri, AtUriError};
