//! Content hashing for revisions and blobs.

use serde::Serialize;
use serde_json::Value;
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;

use crate::types::RevisionType;

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(bytes);
    format!("0x{}", hex::encode(hasher.finalize()))
}

/// Hash of a blob's bytes; this is its `file_hash`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex_digest(bytes)
}

/// The parts of a revision its verification hash commits to.
#[derive(Debug, Serialize)]
pub struct RevisionContent<'a> {
    pub previous_verification_hash: &'a str,
    pub revision_type: RevisionType,
    pub local_timestamp: &'a str,
    /// Type-specific content, e.g. `file_hash` or form entries.
    pub content: &'a BTreeMap<String, Value>,
}

/// Verification hash of a revision: SHA3-256 over its canonical JSON.
///
/// `serde_json` writes struct fields in declaration order and `BTreeMap` keys
/// sorted, so the encoding is deterministic.
pub fn revision_hash(content: &RevisionContent<'_>) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(content)?;
    Ok(hex_digest(&json))
}
