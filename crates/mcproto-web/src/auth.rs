//! Who is acting on a request.

use std::sync::Arc;

use async_trait::async_trait;
use mcproto_atproto::{AtprotoClient, RecordStore, SessionInfo};
use mcproto_registry::RegistryError;
use tracing::debug;

/// An identity and a record store that writes as that identity.
#[derive(Clone)]
pub struct ActingSession {
    pub info: SessionInfo,
    pub store: Arc<dyn RecordStore>,
}

/// Source of identities for API requests.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// The service's own session, re-established if it was lost.
    async fn service_session(&self) -> Result<SessionInfo, RegistryError>;

    /// The identity holding a bearer access token.
    async fn resolve_token(&self, token: &str) -> Result<ActingSession, RegistryError>;
}

/// Authenticates against a PDS with the service's credentials.
pub struct ServiceAuthenticator {
    client: Arc<AtprotoClient>,
    identifier: String,
    password: String,
}

impl ServiceAuthenticator {
    pub fn new(
        client: Arc<AtprotoClient>,
        identifier: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client,
            identifier: identifier.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl Authenticator for ServiceAuthenticator {
    async fn service_session(&self) -> Result<SessionInfo, RegistryError> {
        Ok(self
            .client
            .ensure_session(&self.identifier, &self.password)
            .await?)
    }

    async fn resolve_token(&self, token: &str) -> Result<ActingSession, RegistryError> {
        let client = AtprotoClient::resume(self.client.pds_url(), token).await?;
        let info = client
            .session_info()
            .await
            .ok_or_else(|| RegistryError::Authentication("token has no session".to_string()))?;
        debug!(did = %info.did, "resolved bearer token");
        Ok(ActingSession {
            info,
            store: Arc::new(client),
        })
    }
}
