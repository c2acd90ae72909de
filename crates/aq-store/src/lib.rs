//! SQLite-backed revision store for Aqua provenance chains.
//!
//! The store keeps revisions, their side records (signatures, witnesses,
//! links, forms), the content-addressed file tables and the per-owner head
//! pointers. Reads go through the [`Reader`] trait, which both [`Store`] and
//! the in-transaction handle [`StoreTx`] implement, so the chain engines can
//! traverse either committed state or state they are in the middle of
//! changing.
//!
//! All writes go through [`Store::write`], which runs the closure inside one
//! immediate transaction: it either commits as a whole or leaves nothing
//! behind.

mod append;
mod blobs;
mod ledger;
mod read;
mod schema;
mod write;

pub use append::{FileAttachment, NewRevision, RevisionBody};
pub use blobs::{BlobStorage, FsBlobStore, StoredBlob};
pub use ledger::{FileDetach, Release, SharedRecord};

use aq_core::{
    ContentHash, ContractRecord, FileRecord, FormField, KeyError, LatestEntry, LinkRecord,
    OwnerId, PubkeyHash, Revision, SignatureRecord, WitnessEvent, WitnessRecord,
};
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid key: {0}")]
    Key(#[from] KeyError),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("revision {0} already exists")]
    Duplicate(PubkeyHash),

    #[error("unknown revision {0}")]
    UnknownRevision(PubkeyHash),
}

/// Read access shared by committed and in-transaction views.
pub trait Reader {
    #[doc(hidden)]
    fn conn(&self) -> &Connection;

    fn revision(&self, key: &PubkeyHash) -> Result<Option<Revision>, StoreError> {
        read::revision(self.conn(), key)
    }

    /// Revisions whose `previous` is `key`, ordered by key.
    fn children(&self, key: &PubkeyHash) -> Result<Vec<Revision>, StoreError> {
        read::children(self.conn(), key)
    }

    fn child_keys(&self, key: &PubkeyHash) -> Result<Vec<PubkeyHash>, StoreError> {
        read::child_keys(self.conn(), key)
    }

    fn owner_revision_count(&self, owner: &OwnerId) -> Result<i64, StoreError> {
        read::owner_revision_count(self.conn(), owner)
    }

    fn signature(&self, key: &PubkeyHash) -> Result<Option<SignatureRecord>, StoreError> {
        read::signature(self.conn(), key)
    }

    fn witness(&self, key: &PubkeyHash) -> Result<Option<WitnessRecord>, StoreError> {
        read::witness(self.conn(), key)
    }

    fn witness_event(&self, merkle_root: &str) -> Result<Option<WitnessEvent>, StoreError> {
        read::witness_event(self.conn(), merkle_root)
    }

    /// Number of witness rows pointing at `merkle_root`.
    fn witness_root_users(&self, merkle_root: &str) -> Result<i64, StoreError> {
        read::witness_root_users(self.conn(), merkle_root)
    }

    fn link(&self, key: &PubkeyHash) -> Result<Option<LinkRecord>, StoreError> {
        read::link(self.conn(), key)
    }

    fn forms(&self, key: &PubkeyHash) -> Result<Vec<FormField>, StoreError> {
        read::forms(self.conn(), key)
    }

    fn indexed_file_hash(&self, key: &PubkeyHash) -> Result<Option<ContentHash>, StoreError> {
        read::indexed_file_hash(self.conn(), key)
    }

    fn file_index_members(&self, file_hash: &ContentHash) -> Result<Vec<PubkeyHash>, StoreError> {
        read::file_index_members(self.conn(), file_hash)
    }

    fn file(&self, file_hash: &ContentHash) -> Result<Option<FileRecord>, StoreError> {
        read::file(self.conn(), file_hash)
    }

    fn file_name(&self, key: &PubkeyHash) -> Result<Option<String>, StoreError> {
        read::file_name(self.conn(), key)
    }

    fn latest(&self, key: &PubkeyHash) -> Result<Option<LatestEntry>, StoreError> {
        read::latest(self.conn(), key)
    }

    fn latest_for_owner(&self, owner: &OwnerId) -> Result<Vec<LatestEntry>, StoreError> {
        read::latest_for_owner(self.conn(), owner)
    }

    fn contracts_for_sender(&self, sender: &OwnerId) -> Result<Vec<ContractRecord>, StoreError> {
        read::contracts_for_sender(self.conn(), sender)
    }

    /// Write counter of `owner`; zero until the first mutation.
    fn owner_version(&self, owner: &OwnerId) -> Result<u64, StoreError> {
        read::owner_version(self.conn(), owner)
    }
}

/// Handle to an open revision database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (and migrate) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        schema::migrate(&conn)?;
        debug!(path = %path.as_ref().display(), "opened revision store");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Run `f` inside one immediate transaction.
    ///
    /// The write lock is taken before `f` reads anything, so concurrent
    /// writers on other connections serialize. An `Err` from `f` rolls the
    /// whole transaction back.
    pub fn write<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = f(&StoreTx { conn: &tx })?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

impl Reader for Store {
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Store view inside an open write transaction.
pub struct StoreTx<'a> {
    conn: &'a Connection,
}

impl Reader for StoreTx<'_> {
    fn conn(&self) -> &Connection {
        self.conn
    }
}
