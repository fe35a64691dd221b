//! Deterministic point identifiers.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// UUID derived from the SHA-256 of `namespace` and `key`.
///
/// The same pair always maps to the same id, so re-writing a record
/// overwrites it instead of adding a duplicate.
pub(crate) fn point_id(namespace: &str, key: &str) -> String {
    let digest = Sha256::new()
        .chain_update(namespace.as_bytes())
        .chain_update([0u8])
        .chain_update(key.as_bytes())
        .finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}
