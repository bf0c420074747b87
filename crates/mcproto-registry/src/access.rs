//! Ownership checks for mutating records.

use mcproto_atproto::{AtUri, RecordStore, SERVER_COLLECTION, SessionInfo};
use tracing::{info, warn};

use crate::RegistryError;

/// Outcome of an ownership check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// The acting identity owns the record.
    Allow(AtUri),
    /// Someone else does.
    Deny { owner: String },
}

/// Decide whether `acting_did` may mutate the record at `record_uri`.
///
/// Ownership is the repository DID embedded in the URI; nothing is fetched.
pub fn authorize(record_uri: &str, acting_did: &str) -> Result<Authorization, RegistryError> {
    let uri = AtUri::parse(record_uri)?;
    if uri.did == acting_did {
        Ok(Authorization::Allow(uri))
    } else {
        Ok(Authorization::Deny { owner: uri.did })
    }
}

/// Delete a server descriptor owned by `acting`.
pub async fn delete_server(
    store: &dyn RecordStore,
    acting: &SessionInfo,
    record_uri: &str,
) -> Result<AtUri, RegistryError> {
    let uri = match authorize(record_uri, &acting.did)? {
        Authorization::Allow(uri) => uri,
        Authorization::Deny { owner } => {
            warn!(acting = %acting.did, %owner, uri = record_uri, "refusing to delete record owned by another identity");
            return Err(RegistryError::Authorization {
                acting: acting.did.clone(),
                owner,
            });
        }
    };

    if uri.collection != SERVER_COLLECTION {
        return Err(RegistryError::Validation(format!(
            "{} is not a server record",
            uri
        )));
    }

    store
        .delete_record(&uri.did, &uri.collection, &uri.rkey)
        .await?;

    info!(uri = %uri, "deleted server");
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn owner_is_allowed() {
        let result = authorize("at://did:plc:a/app.mcp.server/k", "did:plc:a").unwrap();
        assert_eq!(
            result,
            Authorization::Allow(AtUri::new("did:plc:a", "app.mcp.server", "k"))
        );
    }

    #[test]
    fn other_identity_is_denied() {
        let result = authorize("at://did:plc:a/app.mcp.server/k", "did:plc:b").unwrap();
        assert_eq!(
            result,
            Authorization::Deny {
                owner: "did:plc:a".to_string()
            }
        );
    }

    #[test]
    fn malformed_uri_is_validation_error() {
        assert!(matches!(
            authorize("not-a-uri", "did:plc:a"),
            Err(RegistryError::Validation(_))
        ));
    }
}
