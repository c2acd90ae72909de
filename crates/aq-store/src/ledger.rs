//! Reference counting for shared records.
//!
//! Signature, witness and link rows carry a `reference_count`; a release that
//! brings it to zero removes the row. Files are tracked two ways: the
//! `file_index` membership set and the `files.reference_count` mirror. A file
//! row is only collected once both are empty.

use aq_core::{ContentHash, FileRecord, PubkeyHash};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::{StoreError, StoreTx};

/// Shared side-record tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedRecord {
    Signature,
    Witness,
    Link,
}

impl SharedRecord {
    fn table(self) -> &'static str {
        match self {
            SharedRecord::Signature => "signatures",
            SharedRecord::Witness => "witnesses",
            SharedRecord::Link => "links",
        }
    }
}

/// Outcome of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// No row existed.
    Missing,
    /// Count decremented; the row stays with this many references.
    Decremented(i64),
    /// Count reached zero and the row was deleted.
    Removed,
}

/// Outcome of detaching a revision from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDetach {
    /// The revision was not in the file's index.
    Missing,
    /// Membership dropped; other references remain.
    Detached { remaining: i64 },
    /// Last reference gone: the file row was deleted and its bytes are garbage.
    Collected(FileRecord),
}

impl StoreTx<'_> {
    /// Take one more reference on an existing shared row.
    pub fn acquire(&self, kind: SharedRecord, key: &PubkeyHash) -> Result<bool, StoreError> {
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET reference_count = reference_count + 1 WHERE owner=?1 AND hash=?2",
                kind.table()
            ),
            params![key.owner.as_str(), key.hash_str()],
        )?;
        Ok(updated > 0)
    }

    /// Drop one reference; the row is deleted when none remain.
    pub fn release(&self, kind: SharedRecord, key: &PubkeyHash) -> Result<Release, StoreError> {
        let table = kind.table();
        let count: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT reference_count FROM {table} WHERE owner=?1 AND hash=?2"),
                params![key.owner.as_str(), key.hash_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(count) = count else {
            return Ok(Release::Missing);
        };

        let remaining = count - 1;
        if remaining <= 0 {
            self.conn.execute(
                &format!("DELETE FROM {table} WHERE owner=?1 AND hash=?2"),
                params![key.owner.as_str(), key.hash_str()],
            )?;
            debug!(table, %key, "released last reference");
            Ok(Release::Removed)
        } else {
            self.conn.execute(
                &format!("UPDATE {table} SET reference_count=?3 WHERE owner=?1 AND hash=?2"),
                params![key.owner.as_str(), key.hash_str(), remaining],
            )?;
            Ok(Release::Decremented(remaining))
        }
    }

    /// Add `key` to the file's index. The file must already be registered.
    /// Returns `false` if `key` was already a member.
    pub fn attach_file(&self, file_hash: &ContentHash, key: &PubkeyHash) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO file_index (file_hash, owner, hash) VALUES (?1, ?2, ?3)",
            params![file_hash.as_str(), key.owner.as_str(), key.hash_str()],
        )?;
        if inserted == 0 {
            return Ok(false);
        }
        let updated = self.conn.execute(
            "UPDATE files SET reference_count = reference_count + 1 WHERE file_hash=?1",
            params![file_hash.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::Corrupt(format!(
                "file {file_hash} indexed before it was registered"
            )));
        }
        Ok(true)
    }

    /// Remove `key` from the file's index and collect the file when unused.
    pub fn detach_file(
        &self,
        file_hash: &ContentHash,
        key: &PubkeyHash,
    ) -> Result<FileDetach, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM file_index WHERE file_hash=?1 AND owner=?2 AND hash=?3",
            params![file_hash.as_str(), key.owner.as_str(), key.hash_str()],
        )?;
        if removed == 0 {
            return Ok(FileDetach::Missing);
        }

        self.conn.execute(
            "UPDATE files SET reference_count = MAX(reference_count - 1, 0) WHERE file_hash=?1",
            params![file_hash.as_str()],
        )?;
        let Some(record) = crate::read::file(self.conn, file_hash)? else {
            return Ok(FileDetach::Detached { remaining: 0 });
        };

        let members: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM file_index WHERE file_hash=?1",
            params![file_hash.as_str()],
            |row| row.get(0),
        )?;
        if record.reference_count == 0 && members == 0 {
            self.conn.execute(
                "DELETE FROM files WHERE file_hash=?1",
                params![file_hash.as_str()],
            )?;
            debug!(%file_hash, location = %record.location, "file collected");
            return Ok(FileDetach::Collected(record));
        }
        Ok(FileDetach::Detached {
            remaining: record.reference_count,
        })
    }
}
