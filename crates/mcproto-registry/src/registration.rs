//! Publishing server descriptors.

use chrono::{DateTime, Duration, Utc};
use mcproto_atproto::{AtUri, RecordStore, SERVER_COLLECTION, SessionInfo};
use tracing::{debug, error, info, warn};

use crate::schema::dedup_tools;
use crate::{Publisher, RegistryError, ServerRecord, record_key};

/// What a publisher says about a server when registering it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerRegistration {
    /// Package id, repository URL or shell command. Determines the record key.
    pub installation: String,
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub tools: Vec<String>,
    pub language: Option<String>,
    pub commit_sha: Option<String>,
}

impl ServerRegistration {
    pub fn new(installation: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            installation: installation.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.installation.trim().is_empty() {
            return Err(RegistryError::Validation(
                "installation must not be empty".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(RegistryError::Validation("name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOutcome {
    pub uri: String,
    pub cid: String,
    pub record: ServerRecord,
    /// False when an existing descriptor was updated.
    pub created: bool,
}

/// Merge a registration into the descriptor already stored for it, if any.
///
/// `createdAt` is kept and `lastRegisteredAt` moves strictly forward even
/// if the clock did not. Tools accumulate: names already recorded keep
/// their position and new ones are appended. Descriptive fields take the
/// incoming values. A publisher whose DID differs from the session's is
/// replaced.
pub fn merge_registration(
    existing: Option<&ServerRecord>,
    incoming: &ServerRegistration,
    session: &SessionInfo,
    now: DateTime<Utc>,
) -> ServerRecord {
    let Some(existing) = existing else {
        return ServerRecord {
            record_type: SERVER_COLLECTION.to_string(),
            name: incoming.name.clone(),
            installation: incoming.installation.clone(),
            version: incoming.version.clone(),
            description: incoming.description.clone(),
            tools: dedup_tools(incoming.tools.iter().cloned()),
            created_at: now,
            last_registered_at: now,
            commit_sha: incoming.commit_sha.clone(),
            language: incoming.language.clone(),
            publisher: Publisher::from_session(session),
        };
    };

    let publisher = if existing.publisher.did == session.did {
        existing.publisher.clone()
    } else {
        warn!(
            recorded = %existing.publisher.did,
            session = %session.did,
            "descriptor names a different publisher, replacing it"
        );
        Publisher::from_session(session)
    };

    ServerRecord {
        record_type: SERVER_COLLECTION.to_string(),
        name: incoming.name.clone(),
        installation: incoming.installation.clone(),
        version: incoming.version.clone(),
        description: incoming.description.clone(),
        tools: dedup_tools(existing.tools.iter().chain(&incoming.tools).cloned()),
        created_at: existing.created_at,
        last_registered_at: now.max(existing.last_registered_at + Duration::milliseconds(1)),
        commit_sha: incoming.commit_sha.clone(),
        language: incoming.language.clone(),
        publisher,
    }
}

/// Publishes descriptors into the acting session's repository.
pub struct Registrar<'a> {
    store: &'a dyn RecordStore,
    session: &'a SessionInfo,
    raise_on_error: bool,
}

impl<'a> Registrar<'a> {
    pub fn new(store: &'a dyn RecordStore, session: &'a SessionInfo) -> Self {
        Self {
            store,
            session,
            raise_on_error: true,
        }
    }

    /// When false, failures are logged and [`Registrar::register`] returns
    /// `Ok(None)` so a server can start regardless.
    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }

    /// Create or refresh the descriptor for `registration.installation`.
    pub async fn register(
        &self,
        registration: &ServerRegistration,
    ) -> Result<Option<RegistrationOutcome>, RegistryError> {
        match self.try_register(registration).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) if !self.raise_on_error => {
                error!(
                    error = %e,
                    installation = %registration.installation,
                    "failed to register server"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn try_register(
        &self,
        registration: &ServerRegistration,
    ) -> Result<RegistrationOutcome, RegistryError> {
        registration.validate()?;

        let rkey = record_key(&registration.installation);
        let existing = self.find_existing(&rkey).await?;

        let record = merge_registration(
            existing.as_ref(),
            registration,
            self.session,
            Utc::now(),
        );
        let value = serde_json::to_value(&record)
            .map_err(|e| RegistryError::Transport(e.into()))?;

        let response = self
            .store
            .put_record(&self.session.did, SERVER_COLLECTION, &rkey, value)
            .await?;

        let created = existing.is_none();
        info!(
            uri = %response.uri,
            name = %record.name,
            tools = record.tools.len(),
            created,
            "registered server"
        );

        Ok(RegistrationOutcome {
            uri: response.uri,
            cid: response.cid,
            record,
            created,
        })
    }

    /// The caller's stored descriptor at `rkey`.
    ///
    /// A listing failure is an error: guessing "absent" here would reset
    /// `createdAt` on the next write.
    async fn find_existing(&self, rkey: &str) -> Result<Option<ServerRecord>, RegistryError> {
        let records = self
            .store
            .list_records(&self.session.did, SERVER_COLLECTION)
            .await?;

        let Some(stored) = records
            .into_iter()
            .find(|r| AtUri::extract_rkey(&r.uri) == rkey)
        else {
            debug!(rkey, "no existing descriptor");
            return Ok(None);
        };

        match ServerRecord::from_stored(&stored.uri, stored.value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(uri = %stored.uri, error = %e, "existing descriptor unreadable, overwriting");
                Ok(None)
            }
        }
    }
}
