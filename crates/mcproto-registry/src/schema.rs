//! Server descriptor and attestation record types.

use chrono::{DateTime, NaiveDateTime, Utc};
use mcproto_atproto::{ATTESTATION_COLLECTION, AtUri, ProfileViewBasic, SERVER_COLLECTION, SessionInfo};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::RegistryError;

fn server_type() -> String {
    SERVER_COLLECTION.to_string()
}

fn attestation_type() -> String {
    ATTESTATION_COLLECTION.to_string()
}

/// Parse a record timestamp.
///
/// Accepts RFC 3339, and also the zone-less ISO form older Python clients
/// wrote (`2025-01-05T10:00:00.123456`), which is taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

/// A missing or null rating reads as 0.
fn deserialize_rating<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

/// Who published a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publisher {
    pub did: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_domain: Option<String>,
}

impl Publisher {
    /// A publisher known only by DID.
    pub fn from_did(did: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            handle: None,
            display_name: None,
            verified_domain: None,
        }
    }

    pub fn from_session(session: &SessionInfo) -> Self {
        Self::with_handle(&session.did, Some(session.handle.clone()), None)
    }

    pub fn from_profile(profile: &ProfileViewBasic) -> Self {
        Self::with_handle(
            &profile.did,
            profile.handle.clone(),
            profile.display_name.clone(),
        )
    }

    /// Handles that look like domain names double as the verified domain.
    fn with_handle(did: &str, handle: Option<String>, display_name: Option<String>) -> Self {
        let verified_domain = handle.as_ref().filter(|h| h.contains('.')).cloned();
        Self {
            did: did.to_string(),
            handle,
            display_name,
            verified_domain,
        }
    }
}

/// An `app.mcp.server` descriptor record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    #[serde(rename = "$type", default = "server_type")]
    pub record_type: String,
    pub name: String,
    pub installation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub last_registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub publisher: Publisher,
}

/// Every shape a descriptor has been written in.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServerRecord {
    name: Option<String>,
    installation: Option<String>,
    package: Option<String>,
    version: Option<String>,
    description: Option<String>,
    tools: Option<Vec<String>>,
    created_at: Option<String>,
    last_registered_at: Option<String>,
    commit_sha: Option<String>,
    language: Option<String>,
    publisher: Option<Publisher>,
}

impl ServerRecord {
    /// Read a stored descriptor, upgrading the legacy shape.
    ///
    /// Legacy records name the installation `package`, carry a plain `type`
    /// field, and may lack `lastRegisteredAt` or `publisher`. The missing
    /// publisher is the repository owner named in `uri`.
    pub fn from_stored(uri: &str, value: Value) -> Result<Self, RegistryError> {
        let raw: RawServerRecord = serde_json::from_value(value)
            .map_err(|e| RegistryError::Validation(format!("{uri}: {e}")))?;

        let name = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| RegistryError::Validation(format!("{uri}: missing name")))?;
        let installation = raw
            .installation
            .or(raw.package)
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| RegistryError::Validation(format!("{uri}: missing installation")))?;

        let created_at = raw
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| RegistryError::Validation(format!("{uri}: missing createdAt")))?;
        let last_registered_at = raw
            .last_registered_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(created_at);

        let publisher = match raw.publisher {
            Some(publisher) => publisher,
            None => Publisher::from_did(AtUri::parse(uri)?.did),
        };

        Ok(Self {
            record_type: server_type(),
            name,
            installation,
            version: raw.version,
            description: raw.description,
            tools: dedup_tools(raw.tools.unwrap_or_default()),
            created_at,
            last_registered_at,
            commit_sha: raw.commit_sha,
            language: raw.language,
            publisher,
        })
    }
}

/// Drop repeated tool names, keeping the first occurrence.
pub(crate) fn dedup_tools(tools: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tool in tools {
        if !out.contains(&tool) {
            out.push(tool);
        }
    }
    out
}

/// Optional usage details attached to an attestation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// An `app.mcp.server.attestation` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRecord {
    #[serde(rename = "$type", default = "attestation_type")]
    pub record_type: String,
    pub server_uri: String,
    #[serde(default, deserialize_with = "deserialize_rating")]
    pub rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl AttestationRecord {
    pub fn new(server_uri: impl Into<String>, rating: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            record_type: attestation_type(),
            server_uri: server_uri.into(),
            rating,
            comment: None,
            timestamp,
            usage: None,
        }
    }
}
