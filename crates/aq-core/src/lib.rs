//! Core data model for Aqua provenance chains.
//!
//! This crate defines the owner-qualified keys, the stored revision and side-record
//! types, the assembled [`AquaTree`] artifact, revision hashing and engine
//! configuration shared by the store and the chain engines.
//!
//! # Example
//!
//! ```
//! use aq_core::{AquaTree, OwnerId, PubkeyHash};
//!
//! let owner = OwnerId::new("0xalice").unwrap();
//! let key = PubkeyHash::parse_or_inherit("0xabc", &owner).unwrap();
//! assert_eq!(key.to_string(), "0xalice_0xabc");
//!
//! let tree = AquaTree::new();
//! assert!(tree.genesis_hash().is_none());
//! ```

mod cancel;
mod config;
pub mod hash;
mod ids;
mod tree;
mod types;

pub use cancel::Cancellation;
pub use config::{ConfigError, EngineConfig, SYSTEM_OWNER, SYSTEM_TEMPLATE_HASHES};
pub use ids::{hash_only, ContentHash, KeyError, OwnerId, PubkeyHash, KEY_SEPARATOR};
pub use tree::{
    compound_key, AquaTree, FileContent, FileObject, RevisionMap, RevisionPayload, ERROR_MARKER,
    VERSION_TAG,
};
pub use types::{
    ContractRecord, FileRecord, FormField, LatestEntry, LinkRecord, Revision, RevisionType,
    SignatureRecord, WitnessEvent, WitnessRecord,
};

/// Current time in the aqua `local_timestamp` format.
pub fn aqua_timestamp() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S").to_string()
}
