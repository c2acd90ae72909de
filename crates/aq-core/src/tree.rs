//! The assembled `AquaTree` artifact.
//!
//! An `AquaTree` is what API layers hand out for one chain: the revisions keyed
//! by hash-only identity (genesis first), the file index, and optionally the
//! nested trees of linked chains plus the downloadable file objects.

use crate::types::RevisionType;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Protocol version tag written into every payload.
pub const VERSION_TAG: &str = "https://aqua-protocol.org/docs/v3/schema_2 | SHA256 | Method: scalar";

/// Placeholder used wherever secondary data (linked chains, files) could not be resolved.
pub const ERROR_MARKER: &str = "--error--";

/// Key under which a linked chain is stored in its parent tree.
pub fn compound_key(parent_hash: &str, linked_hash: &str) -> String {
    format!("{parent_hash}_{linked_hash}")
}

/// Serialized form of one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionPayload {
    pub revision_type: RevisionType,
    /// Hash-only; empty for a genesis revision.
    pub previous_verification_hash: String,
    pub local_timestamp: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaves: Option<Vec<String>>,
    /// Type-specific fields (file hash, form entries, witness/signature/link data).
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl RevisionPayload {
    pub fn is_genesis(&self) -> bool {
        self.previous_verification_hash.is_empty()
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// `link_verification_hashes` as strings, empty for non-link payloads.
    pub fn link_verification_hashes(&self) -> Vec<String> {
        match self.fields.get("link_verification_hashes") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Insertion-ordered map of hash-only revision keys to payloads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevisionMap {
    entries: Vec<(String, RevisionPayload)>,
    /// Position of each hash in `entries`.
    index: HashMap<String, usize>,
}

impl RevisionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn insert(&mut self, hash: String, payload: RevisionPayload) {
        match self.index.get(&hash) {
            Some(&position) => self.entries[position].1 = payload,
            None => {
                self.index.insert(hash.clone(), self.entries.len());
                self.entries.push((hash, payload));
            }
        }
    }

    pub fn get(&self, hash: &str) -> Option<&RevisionPayload> {
        let position = *self.index.get(hash)?;
        self.entries.get(position).map(|(_, payload)| payload)
    }

    pub fn contains_key(&self, hash: &str) -> bool {
        self.get(hash).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RevisionPayload)> {
        self.entries
            .iter()
            .map(|(key, payload)| (key.as_str(), payload))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for RevisionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, payload) in &self.entries {
            map.serialize_entry(key, payload)?;
        }
        map.end()
    }
}

struct RevisionMapVisitor;

impl<'de> Visitor<'de> for RevisionMapVisitor {
    type Value = RevisionMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of revision hashes to payloads")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut revisions = RevisionMap::new();
        while let Some((key, payload)) = access.next_entry::<String, RevisionPayload>()? {
            revisions.insert(key, payload);
        }
        Ok(revisions)
    }
}

impl<'de> Deserialize<'de> for RevisionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RevisionMapVisitor)
    }
}

/// Content of a downloadable artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileContent {
    /// Download URL of a stored blob.
    Url(String),
    /// An embedded chain, as in `<name>.aqua.json`.
    Tree(Box<AquaTree>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileContent")]
    pub file_content: FileContent,
    pub path: String,
    #[serde(rename = "fileSize")]
    pub file_size: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AquaTree {
    pub revisions: RevisionMap,
    pub file_index: BTreeMap<String, String>,
    #[serde(
        rename = "linkedChains",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub linked_chains: Option<BTreeMap<String, AquaTree>>,
    #[serde(rename = "fileObjects", default, skip_serializing_if = "Option::is_none")]
    pub file_objects: Option<Vec<FileObject>>,
}

impl AquaTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// First revision without a previous hash.
    pub fn genesis_hash(&self) -> Option<&str> {
        self.revisions
            .iter()
            .find(|(_, payload)| payload.is_genesis())
            .map(|(hash, _)| hash)
    }

    /// Hash no other revision names as its previous. Last one wins on a fork.
    pub fn latest_hash(&self) -> Option<&str> {
        let referenced: HashSet<&str> = self
            .revisions
            .iter()
            .map(|(_, payload)| payload.previous_verification_hash.as_str())
            .filter(|prev| !prev.is_empty())
            .collect();
        self.revisions
            .keys()
            .filter(|hash| !referenced.contains(hash))
            .last()
    }

    /// Hashes genesis first, following previous links. Revisions off the main
    /// line (a second branch) follow in map order.
    pub fn ordered_hashes(&self) -> Vec<String> {
        let mut ordered: Vec<String> = Vec::with_capacity(self.revisions.len());
        let mut seen: HashSet<&str> = HashSet::new();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for (hash, payload) in self.revisions.iter() {
            children
                .entry(payload.previous_verification_hash.as_str())
                .or_default()
                .push(hash);
        }

        let mut current = self.genesis_hash();
        while let Some(hash) = current {
            if !seen.insert(hash) {
                break;
            }
            ordered.push(hash.to_string());
            current = children
                .get(hash)
                .and_then(|next| next.iter().copied().find(|child| !seen.contains(child)));
        }

        for hash in self.revisions.keys() {
            if seen.insert(hash) {
                ordered.push(hash.to_string());
            }
        }
        ordered
    }

    pub fn linked_chain(&self, key: &str) -> Option<&AquaTree> {
        self.linked_chains.as_ref().and_then(|chains| chains.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(previous: &str) -> RevisionPayload {
        RevisionPayload {
            revision_type: RevisionType::File,
            previous_verification_hash: previous.to_string(),
            local_timestamp: "20250101000000".to_string(),
            version: VERSION_TAG.to_string(),
            leaves: None,
            fields: BTreeMap::new(),
        }
    }

    fn chain(links: &[(&str, &str)]) -> AquaTree {
        let mut tree = AquaTree::new();
        for (hash, previous) in links {
            tree.revisions.insert(hash.to_string(), payload(previous));
        }
        tree
    }

    #[test]
    fn test_genesis_and_latest() {
        let tree = chain(&[("g", ""), ("r1", "g"), ("r2", "r1")]);
        assert_eq!(tree.genesis_hash(), Some("g"));
        assert_eq!(tree.latest_hash(), Some("r2"));
    }

    #[test]
    fn test_ordered_hashes_ignores_insertion_order() {
        let tree = chain(&[("r2", "r1"), ("g", ""), ("r1", "g")]);
        assert_eq!(tree.ordered_hashes(), vec!["g", "r1", "r2"]);
    }

    #[test]
    fn test_ordered_hashes_appends_side_branch() {
        let tree = chain(&[("g", ""), ("a", "g"), ("b", "g")]);
        assert_eq!(tree.ordered_hashes(), vec!["g", "a", "b"]);
    }

    #[test]
    fn test_revision_map_replace_keeps_position() {
        let mut tree = chain(&[("g", ""), ("r1", "g"), ("r2", "r1")]);
        let mut updated = payload("g");
        updated.local_timestamp = "20260101000000".to_string();
        tree.revisions.insert("r1".to_string(), updated);

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.revisions.keys().collect::<Vec<_>>(), vec!["g", "r1", "r2"]);
        assert_eq!(tree.revisions.get("r1").unwrap().local_timestamp, "20260101000000");
        assert!(tree.revisions.get("r3").is_none());
    }

    #[test]
    fn test_ordered_hashes_long_chain() {
        let hashes: Vec<String> = (0..2000).map(|i| format!("h{i}")).collect();
        let mut tree = AquaTree::new();
        for (i, hash) in hashes.iter().enumerate().rev() {
            let previous = if i == 0 { String::new() } else { hashes[i - 1].clone() };
            tree.revisions.insert(hash.clone(), payload(&previous));
        }
        assert_eq!(tree.ordered_hashes(), hashes);
    }

    #[test]
    fn test_empty_tree() {
        let tree = AquaTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.genesis_hash(), None);
        assert_eq!(tree.latest_hash(), None);
        assert!(tree.ordered_hashes().is_empty());
    }

    #[test]
    fn test_revision_map_keeps_document_order() {
        let tree = chain(&[("g", ""), ("r1", "g"), ("r2", "r1")]);
        let json = serde_json::to_string(&tree).unwrap();
        let g = json.find("\"g\"").unwrap();
        let r2 = json.find("\"r2\"").unwrap();
        assert!(g < r2);

        let back: AquaTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back.revisions.keys().collect::<Vec<_>>(), vec!["g", "r1", "r2"]);
        assert_eq!(back, tree);
    }

    #[test]
    fn test_optional_members_are_camel_case() {
        let mut tree = chain(&[("g", "")]);
        tree.linked_chains = Some(BTreeMap::new());
        tree.file_objects = Some(vec![FileObject {
            file_name: "a.txt".to_string(),
            file_content: FileContent::Url("http://x/files/0x1".to_string()),
            path: String::new(),
            file_size: 3,
        }]);
        let json = serde_json::to_value(&tree).unwrap();
        assert!(json.get("linkedChains").is_some());
        assert_eq!(json["fileObjects"][0]["fileName"], "a.txt");
        assert_eq!(json["fileObjects"][0]["fileSize"], 3);
    }

    #[test]
    fn test_flattened_fields() {
        let mut p = payload("");
        p.fields
            .insert("file_hash".to_string(), Value::String("0xf".to_string()));
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["file_hash"], "0xf");
        assert!(json.get("leaves").is_none());
        assert_eq!(json["revision_type"], "file");
    }

    #[test]
    fn test_compound_key() {
        assert_eq!(compound_key("r2", "s0"), "r2_s0");
    }
}
