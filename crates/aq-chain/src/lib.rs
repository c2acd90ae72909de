//! Traversal and assembly of Aqua revision chains.
//!
//! The [`walker`] follows `previous` pointers from a head back to genesis (and
//! children forward), the [`assembler`] turns a walked chain into an
//! [`AquaTree`](aq_core::AquaTree), the [`resolver`] expands link revisions
//! into nested linked chains and the [`materializer`] lists the downloadable
//! files of a tree. [`TreeFetcher`] composes all four.
//!
//! Every operation here is read-only. Errors share one taxonomy,
//! [`ProvenanceError`], which the deletion and merge engines reuse.

pub mod assembler;
pub mod materializer;
pub mod resolver;
pub mod walker;

pub use assembler::{assemble, canonical_order, revision_payload};
pub use materializer::{materialize, FileMaterializer};
pub use resolver::{link_target, FetchOptions, TreeFetcher};
pub use walker::{
    connected_set, order_from_genesis, walk, walk_forward, walk_from_genesis, ConnectedRevision,
};

use aq_core::{KeyError, OwnerId, PubkeyHash};
use aq_store::StoreError;
use thiserror::Error;

/// Errors raised by chain traversal, assembly and the mutating engines.
#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("revision {0} not found")]
    NotFound(PubkeyHash),

    #[error("chain integrity violated at {key}: {reason}")]
    ChainIntegrity { key: PubkeyHash, reason: String },

    #[error("chain at {0} branches; no single order exists")]
    DivergenceAmbiguous(PubkeyHash),

    #[error("transaction rolled back: {0}")]
    TransactionFailure(#[source] StoreError),

    #[error("owner {owner} changed concurrently (expected version {expected}, found {actual})")]
    Conflict {
        owner: OwnerId,
        expected: u64,
        actual: u64,
    },

    #[error("{actor} is not allowed to modify {key}")]
    Unauthorized { actor: OwnerId, key: PubkeyHash },

    #[error("operation cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid key: {0}")]
    Key(#[from] KeyError),
}

impl ProvenanceError {
    pub(crate) fn integrity(key: &PubkeyHash, reason: impl Into<String>) -> Self {
        ProvenanceError::ChainIntegrity {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    /// Reclassify a store failure raised inside a write transaction.
    pub fn rolled_back(self) -> Self {
        match self {
            ProvenanceError::Store(err) => ProvenanceError::TransactionFailure(err),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvenanceError>;
