use sha2::{Digest, Sha256};

/// Record key for a server descriptor: the first 32 hex characters of the
/// SHA-256 of the installation string.
///
/// Other mcproto clients derive keys the same way, so the same installation
/// lands in the same slot no matter which client registered it.
pub fn record_key(installation: &str) -> String {
    let mut key = hex::encode(Sha256::digest(installation.as_bytes()));
    key.truncate(32);
    key
}
