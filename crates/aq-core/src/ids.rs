//! Composite revision keys.
//!
//! Every revision is owned by exactly one owner (a wallet address). Older data
//! encodes this as `owner_hash`; here the pair is kept explicit and the string
//! form only exists at the edges.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Separator used by the legacy `owner_hash` encoding.
pub const KEY_SEPARATOR: char = '_';

/// Errors produced while parsing keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("empty {0}")]
    Empty(&'static str),

    #[error("{kind} '{value}' must not contain '_'")]
    Separator { kind: &'static str, value: String },

    #[error("'{0}' is not an owner-qualified key")]
    Unqualified(String),
}

fn validate(kind: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::Empty(kind));
    }
    if value.contains(KEY_SEPARATOR) {
        return Err(KeyError::Separator {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Owner (wallet address) of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(value: impl Into<String>) -> Result<Self, KeyError> {
        let value = value.into();
        validate("owner", &value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OwnerId {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(value: OwnerId) -> Self {
        value.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash-only identity of a revision or a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(value: impl Into<String>) -> Result<Self, KeyError> {
        let value = value.into();
        validate("hash", &value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentHash {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owner-qualified revision key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PubkeyHash {
    pub owner: OwnerId,
    pub hash: ContentHash,
}

impl PubkeyHash {
    pub fn new(owner: OwnerId, hash: ContentHash) -> Self {
        Self { owner, hash }
    }

    /// Parse the legacy `owner_hash` form. Bare hashes are rejected.
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        match raw.split_once(KEY_SEPARATOR) {
            Some((owner, hash)) => Ok(Self {
                owner: OwnerId::new(owner)?,
                hash: ContentHash::new(hash)?,
            }),
            None => Err(KeyError::Unqualified(raw.to_string())),
        }
    }

    /// Parse either form; a bare hash takes `owner`.
    pub fn parse_or_inherit(raw: &str, owner: &OwnerId) -> Result<Self, KeyError> {
        if raw.contains(KEY_SEPARATOR) {
            Self::parse(raw)
        } else {
            Ok(Self {
                owner: owner.clone(),
                hash: ContentHash::new(raw)?,
            })
        }
    }

    /// Same content hash under a different owner.
    pub fn with_owner(&self, owner: &OwnerId) -> Self {
        Self {
            owner: owner.clone(),
            hash: self.hash.clone(),
        }
    }

    pub fn hash_str(&self) -> &str {
        self.hash.as_str()
    }
}

impl fmt::Display for PubkeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.owner, KEY_SEPARATOR, self.hash)
    }
}

impl Serialize for PubkeyHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PubkeyHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PubkeyHash::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Strip an owner qualifier if present.
pub fn hash_only(raw: &str) -> &str {
    match raw.split_once(KEY_SEPARATOR) {
        Some((_, hash)) => hash,
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(s: &str) -> OwnerId {
        OwnerId::new(s).unwrap()
    }

    #[test]
    fn test_parse_qualified() {
        let key = PubkeyHash::parse("0xalice_0xabc").unwrap();
        assert_eq!(key.owner.as_str(), "0xalice");
        assert_eq!(key.hash.as_str(), "0xabc");
        assert_eq!(key.to_string(), "0xalice_0xabc");
    }

    #[test]
    fn test_parse_rejects_bare_hash() {
        assert_eq!(
            PubkeyHash::parse("0xabc"),
            Err(KeyError::Unqualified("0xabc".to_string()))
        );
    }

    #[test]
    fn test_parse_or_inherit_bare_hash() {
        let key = PubkeyHash::parse_or_inherit("0xabc", &owner("0xbob")).unwrap();
        assert_eq!(key.owner, owner("0xbob"));
        assert_eq!(key.hash_str(), "0xabc");
    }

    #[test]
    fn test_parse_or_inherit_keeps_explicit_owner() {
        let key = PubkeyHash::parse_or_inherit("0xcarol_0xabc", &owner("0xbob")).unwrap();
        assert_eq!(key.owner, owner("0xcarol"));
    }

    #[test]
    fn test_extra_separator_is_rejected() {
        assert!(PubkeyHash::parse("a_b_c").is_err());
        assert!(PubkeyHash::parse("_abc").is_err());
        assert!(OwnerId::new("").is_err());
    }

    #[test]
    fn test_hash_only() {
        assert_eq!(hash_only("0xalice_0xabc"), "0xabc");
        assert_eq!(hash_only("0xabc"), "0xabc");
    }

    #[test]
    fn test_with_owner() {
        let key = PubkeyHash::parse("a_h").unwrap();
        let moved = key.with_owner(&owner("b"));
        assert_eq!(moved.to_string(), "b_h");
    }

    #[test]
    fn test_serde_uses_legacy_form() {
        let key = PubkeyHash::parse("a_h").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"a_h\"");
        let back: PubkeyHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
