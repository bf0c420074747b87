//! HTTP API for the mcproto registry.
//!
//! - `GET /api/servers`: every visible server descriptor
//! - `DELETE /api/servers/{uri}`: delete a descriptor the caller owns
//! - `GET /api/servers/{uri}/attestations`: latest attestation per publisher
//! - `GET /api/health`
//!
//! Every route runs behind a layer that makes sure the service's own
//! session is live.

mod auth;
mod error;
mod routes;

pub use auth::{ActingSession, Authenticator, ServiceAuthenticator};
pub use error::ApiError;
pub use routes::{AppState, create_router};
