//! Row-level mutations, available only inside [`Store::write`](crate::Store::write).

use aq_core::{
    ContentHash, FormField, LatestEntry, LinkRecord, OwnerId, PubkeyHash, Revision,
    SignatureRecord, WitnessEvent,
};
use rusqlite::params;

use crate::{StoreError, StoreTx};

impl StoreTx<'_> {
    /// Insert a revision row. `previous` is stored in its qualified form.
    pub fn insert_revision(&self, revision: &Revision) -> Result<(), StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO revisions \
             (owner, hash, previous, revision_type, local_timestamp, has_content, leaves, obsolete) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                revision.key.owner.as_str(),
                revision.key.hash_str(),
                revision.previous.as_ref().map(ToString::to_string),
                revision.revision_type.as_str(),
                revision.local_timestamp,
                revision.has_content,
                serde_json::to_string(&revision.verification_leaves)?,
                revision.obsolete,
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::Duplicate(revision.key.clone()));
        }
        Ok(())
    }

    pub fn delete_revision_row(&self, key: &PubkeyHash) -> Result<bool, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM revisions WHERE owner=?1 AND hash=?2",
            params![key.owner.as_str(), key.hash_str()],
        )?;
        Ok(removed > 0)
    }

    /// Drop the `previous` pointer of every revision that names `key`.
    /// Returns how many survivors were touched.
    pub fn clear_previous_refs(&self, key: &PubkeyHash) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "UPDATE revisions SET previous=NULL \
             WHERE previous=?1 OR (previous=?2 AND owner=?3)",
            params![key.to_string(), key.hash_str(), key.owner.as_str()],
        )?)
    }

    pub fn set_obsolete(&self, key: &PubkeyHash, obsolete: bool) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE revisions SET obsolete=?3 WHERE owner=?1 AND hash=?2",
            params![key.owner.as_str(), key.hash_str(), obsolete],
        )?;
        Ok(())
    }

    pub fn insert_signature(
        &self,
        key: &PubkeyHash,
        signature: &SignatureRecord,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO signatures \
             (owner, hash, digest, wallet_address, public_key, signature_type, reference_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1) \
             ON CONFLICT(owner, hash) DO UPDATE SET reference_count = reference_count + 1",
            params![
                key.owner.as_str(),
                key.hash_str(),
                signature.digest,
                signature.wallet_address,
                signature.public_key,
                signature.signature_type,
            ],
        )?;
        Ok(())
    }

    pub fn insert_witness(&self, key: &PubkeyHash, merkle_root: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO witnesses (owner, hash, merkle_root, reference_count) \
             VALUES (?1, ?2, ?3, 1) \
             ON CONFLICT(owner, hash) DO UPDATE SET reference_count = reference_count + 1",
            params![key.owner.as_str(), key.hash_str(), merkle_root],
        )?;
        Ok(())
    }

    /// Witness events are shared; an existing row for the root is kept.
    pub fn upsert_witness_event(&self, event: &WitnessEvent) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO witness_events \
             (merkle_root, timestamp, network, contract_address, transaction_hash, \
              sender_account_address) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.merkle_root,
                event.timestamp,
                event.network,
                event.contract_address,
                event.transaction_hash,
                event.sender_account_address,
            ],
        )?;
        Ok(())
    }

    /// Delete the event for `merkle_root` unless a witness row still uses it.
    pub fn collect_witness_event(&self, merkle_root: &str) -> Result<bool, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM witness_events WHERE merkle_root=?1 \
             AND NOT EXISTS (SELECT 1 FROM witnesses WHERE merkle_root=?1)",
            params![merkle_root],
        )?;
        Ok(removed > 0)
    }

    pub fn insert_link(&self, key: &PubkeyHash, link: &LinkRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO links \
             (owner, hash, link_type, verification_hashes, file_hashes, reference_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, 1) \
             ON CONFLICT(owner, hash) DO UPDATE SET reference_count = reference_count + 1",
            params![
                key.owner.as_str(),
                key.hash_str(),
                link.link_type,
                serde_json::to_string(&link.verification_hashes)?,
                serde_json::to_string(&link.file_hashes)?,
            ],
        )?;
        Ok(())
    }

    pub fn insert_forms(&self, key: &PubkeyHash, fields: &[FormField]) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO aqua_forms (owner, hash, key, value, field_type) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for field in fields {
            stmt.execute(params![
                key.owner.as_str(),
                key.hash_str(),
                field.key,
                field.value,
                field.field_type,
            ])?;
        }
        Ok(())
    }

    pub fn delete_forms(&self, key: &PubkeyHash) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "DELETE FROM aqua_forms WHERE owner=?1 AND hash=?2",
            params![key.owner.as_str(), key.hash_str()],
        )?)
    }

    /// Register a blob. An existing row keeps its location and count.
    pub fn register_file(
        &self,
        file_hash: &ContentHash,
        location: &str,
        size: i64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO files (file_hash, location, size, reference_count) \
             VALUES (?1, ?2, ?3, 0)",
            params![file_hash.as_str(), location, size],
        )?;
        Ok(())
    }

    pub fn set_file_name(&self, key: &PubkeyHash, name: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO file_names (owner, hash, name) VALUES (?1, ?2, ?3) \
             ON CONFLICT(owner, hash) DO UPDATE SET name = excluded.name",
            params![key.owner.as_str(), key.hash_str(), name],
        )?;
        Ok(())
    }

    pub fn delete_file_name(&self, key: &PubkeyHash) -> Result<bool, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM file_names WHERE owner=?1 AND hash=?2",
            params![key.owner.as_str(), key.hash_str()],
        )?;
        Ok(removed > 0)
    }

    pub fn upsert_latest(&self, entry: &LatestEntry) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO latest (owner, hash, template_id, is_workflow) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(owner, hash) DO UPDATE SET \
             template_id = excluded.template_id, is_workflow = excluded.is_workflow",
            params![
                entry.key.owner.as_str(),
                entry.key.hash_str(),
                entry.template_id,
                entry.is_workflow,
            ],
        )?;
        Ok(())
    }

    pub fn delete_latest(&self, key: &PubkeyHash) -> Result<bool, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM latest WHERE owner=?1 AND hash=?2",
            params![key.owner.as_str(), key.hash_str()],
        )?;
        Ok(removed > 0)
    }

    /// Move the Latest entry at `from` (if any) to `to`, keeping its tags.
    /// Without an entry at `from` a fresh untagged one is created.
    pub fn move_latest(&self, from: Option<&PubkeyHash>, to: &PubkeyHash) -> Result<(), StoreError> {
        let carried = match from {
            Some(from) => {
                let entry = crate::read::latest(self.conn, from)?;
                if entry.is_some() {
                    self.delete_latest(from)?;
                }
                entry
            }
            None => None,
        };
        let (template_id, is_workflow) = carried
            .map(|entry| (entry.template_id, entry.is_workflow))
            .unwrap_or((None, false));
        self.upsert_latest(&LatestEntry {
            key: to.clone(),
            template_id,
            is_workflow,
        })
    }

    /// Record a share of `genesis_hash`..`latest_hash`. Returns the contract id.
    pub fn add_contract(
        &self,
        sender: &OwnerId,
        receiver: Option<&OwnerId>,
        genesis_hash: &str,
        latest_hash: &str,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO contracts (sender, receiver, genesis_hash, latest_hash) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                sender.as_str(),
                receiver.map(OwnerId::as_str),
                genesis_hash,
                latest_hash,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn delete_contract(&self, id: i64) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM contracts WHERE id=?1", params![id])?;
        Ok(removed > 0)
    }

    /// Increment and return the owner's write counter.
    pub fn bump_owner_version(&self, owner: &OwnerId) -> Result<u64, StoreError> {
        self.conn.execute(
            "INSERT INTO owner_versions (owner, version) VALUES (?1, 1) \
             ON CONFLICT(owner) DO UPDATE SET version = version + 1",
            params![owner.as_str()],
        )?;
        crate::read::owner_version(self.conn, owner)
    }
}
