//! Revision and side-record data structures.

use crate::ids::{ContentHash, OwnerId, PubkeyHash};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a revision. Decides which side record carries its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionType {
    File,
    Form,
    Signature,
    Witness,
    Link,
}

impl RevisionType {
    pub fn as_str(self) -> &'static str {
        match self {
            RevisionType::File => "file",
            RevisionType::Form => "form",
            RevisionType::Signature => "signature",
            RevisionType::Witness => "witness",
            RevisionType::Link => "link",
        }
    }

    /// File and form revisions both reference a blob through the file index.
    pub fn carries_file(self) -> bool {
        matches!(self, RevisionType::File | RevisionType::Form)
    }
}

impl fmt::Display for RevisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevisionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(RevisionType::File),
            "form" => Ok(RevisionType::Form),
            "signature" => Ok(RevisionType::Signature),
            "witness" => Ok(RevisionType::Witness),
            "link" => Ok(RevisionType::Link),
            other => Err(format!("unknown revision type '{other}'")),
        }
    }
}

/// One stored revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub key: PubkeyHash,
    pub revision_type: RevisionType,
    /// `None` for a genesis revision.
    pub previous: Option<PubkeyHash>,
    #[serde(default)]
    pub children: Vec<PubkeyHash>,
    /// Aqua timestamp, `%Y%m%d%H%M%S`.
    pub local_timestamp: String,
    pub has_content: bool,
    #[serde(default)]
    pub verification_leaves: Vec<String>,
    /// Hidden by a `replace` merge; never walked forward into.
    #[serde(default)]
    pub obsolete: bool,
}

impl Revision {
    pub fn is_genesis(&self) -> bool {
        self.previous.is_none()
    }

    pub fn owner(&self) -> &OwnerId {
        &self.key.owner
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub digest: String,
    pub wallet_address: String,
    pub public_key: String,
    pub signature_type: String,
    pub reference_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessRecord {
    pub merkle_root: String,
    pub reference_count: i64,
}

/// Anchoring event shared by every witness with the same merkle root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessEvent {
    pub merkle_root: String,
    pub timestamp: String,
    pub network: String,
    pub contract_address: String,
    pub transaction_hash: String,
    pub sender_account_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub link_type: String,
    /// First entry names the linked revision (bare or owner-qualified).
    pub verification_hashes: Vec<String>,
    pub file_hashes: Vec<String>,
    pub reference_count: i64,
}

impl LinkRecord {
    pub fn target(&self) -> Option<&str> {
        self.verification_hashes
            .first()
            .map(String::as_str)
            .filter(|hash| !hash.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub key: String,
    pub value: String,
    pub field_type: String,
}

/// Content-addressed blob metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_hash: ContentHash,
    /// Location relative to the blob store root.
    pub location: String,
    pub size: i64,
    pub reference_count: i64,
}

/// Head pointer of one chain for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestEntry {
    pub key: PubkeyHash,
    pub template_id: Option<String>,
    pub is_workflow: bool,
}

/// Share record between two owners. Hashes are hash-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: i64,
    pub sender: OwnerId,
    pub receiver: Option<OwnerId>,
    pub genesis_hash: String,
    pub latest_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_type_round_trip_names() {
        for kind in [
            RevisionType::File,
            RevisionType::Form,
            RevisionType::Signature,
            RevisionType::Witness,
            RevisionType::Link,
        ] {
            assert_eq!(kind.as_str().parse::<RevisionType>().unwrap(), kind);
        }
        assert!("commit".parse::<RevisionType>().is_err());
    }

    #[test]
    fn test_link_target_skips_empty() {
        let mut link = LinkRecord {
            link_type: "aqua".to_string(),
            verification_hashes: vec![String::new()],
            file_hashes: vec![],
            reference_count: 1,
        };
        assert_eq!(link.target(), None);
        link.verification_hashes = vec!["0xabc".to_string(), "0xdef".to_string()];
        assert_eq!(link.target(), Some("0xabc"));
    }
}
