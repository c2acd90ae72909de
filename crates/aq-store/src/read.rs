//! Point and relation lookups shared by [`Store`](crate::Store) and
//! [`StoreTx`](crate::StoreTx).

use aq_core::{
    ContentHash, ContractRecord, FileRecord, FormField, LatestEntry, LinkRecord, OwnerId,
    PubkeyHash, Revision, RevisionType, SignatureRecord, WitnessEvent, WitnessRecord,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::StoreError;

const REVISION_COLUMNS: &str =
    "owner, hash, previous, revision_type, local_timestamp, has_content, leaves, obsolete";

struct RevisionRow {
    owner: String,
    hash: String,
    previous: Option<String>,
    revision_type: String,
    local_timestamp: String,
    has_content: bool,
    leaves: String,
    obsolete: bool,
}

impl RevisionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            owner: row.get(0)?,
            hash: row.get(1)?,
            previous: row.get(2)?,
            revision_type: row.get(3)?,
            local_timestamp: row.get(4)?,
            has_content: row.get(5)?,
            leaves: row.get(6)?,
            obsolete: row.get(7)?,
        })
    }

    fn key(&self) -> Result<PubkeyHash, StoreError> {
        Ok(PubkeyHash::new(
            OwnerId::new(self.owner.as_str())?,
            ContentHash::new(self.hash.as_str())?,
        ))
    }

    fn into_revision(self, children: Vec<PubkeyHash>) -> Result<Revision, StoreError> {
        let owner = OwnerId::new(self.owner)?;
        let key = PubkeyHash::new(owner.clone(), ContentHash::new(self.hash)?);
        let revision_type: RevisionType = self
            .revision_type
            .parse()
            .map_err(|err: String| StoreError::Corrupt(format!("{key}: {err}")))?;
        // Bare previous hashes are legacy rows; they belong to the same owner.
        let previous = match self.previous.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(PubkeyHash::parse_or_inherit(raw, &owner)?),
        };
        Ok(Revision {
            key,
            revision_type,
            previous,
            children,
            local_timestamp: self.local_timestamp,
            has_content: self.has_content,
            verification_leaves: serde_json::from_str(&self.leaves)?,
            obsolete: self.obsolete,
        })
    }
}

pub(crate) fn revision(conn: &Connection, key: &PubkeyHash) -> Result<Option<Revision>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {REVISION_COLUMNS} FROM revisions WHERE owner=?1 AND hash=?2"),
            params![key.owner.as_str(), key.hash_str()],
            RevisionRow::from_row,
        )
        .optional()?;
    match row {
        None => Ok(None),
        Some(row) => {
            let children = child_keys(conn, key)?;
            row.into_revision(children).map(Some)
        }
    }
}

const CHILDREN_FILTER: &str = "previous=?1 OR (previous=?2 AND owner=?3)";

/// Keys of revisions whose `previous` names `key`, in either stored form.
pub(crate) fn child_keys(conn: &Connection, key: &PubkeyHash) -> Result<Vec<PubkeyHash>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT owner, hash FROM revisions WHERE {CHILDREN_FILTER} ORDER BY owner, hash"
    ))?;
    let rows = stmt
        .query_map(
            params![key.to_string(), key.hash_str(), key.owner.as_str()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(owner, hash)| Ok(PubkeyHash::new(OwnerId::new(owner)?, ContentHash::new(hash)?)))
        .collect()
}

pub(crate) fn children(conn: &Connection, key: &PubkeyHash) -> Result<Vec<Revision>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REVISION_COLUMNS} FROM revisions WHERE {CHILDREN_FILTER} ORDER BY owner, hash"
    ))?;
    let rows = stmt
        .query_map(
            params![key.to_string(), key.hash_str(), key.owner.as_str()],
            RevisionRow::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|row| {
            let grandchildren = child_keys(conn, &row.key()?)?;
            row.into_revision(grandchildren)
        })
        .collect()
}

pub(crate) fn owner_revision_count(conn: &Connection, owner: &OwnerId) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM revisions WHERE owner=?1",
        params![owner.as_str()],
        |row| row.get(0),
    )?)
}

pub(crate) fn signature(
    conn: &Connection,
    key: &PubkeyHash,
) -> Result<Option<SignatureRecord>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT digest, wallet_address, public_key, signature_type, reference_count \
             FROM signatures WHERE owner=?1 AND hash=?2",
            params![key.owner.as_str(), key.hash_str()],
            |row| {
                Ok(SignatureRecord {
                    digest: row.get(0)?,
                    wallet_address: row.get(1)?,
                    public_key: row.get(2)?,
                    signature_type: row.get(3)?,
                    reference_count: row.get(4)?,
                })
            },
        )
        .optional()?)
}

pub(crate) fn witness(conn: &Connection, key: &PubkeyHash) -> Result<Option<WitnessRecord>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT merkle_root, reference_count FROM witnesses WHERE owner=?1 AND hash=?2",
            params![key.owner.as_str(), key.hash_str()],
            |row| {
                Ok(WitnessRecord {
                    merkle_root: row.get(0)?,
                    reference_count: row.get(1)?,
                })
            },
        )
        .optional()?)
}

pub(crate) fn witness_event(
    conn: &Connection,
    merkle_root: &str,
) -> Result<Option<WitnessEvent>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT merkle_root, timestamp, network, contract_address, transaction_hash, \
             sender_account_address FROM witness_events WHERE merkle_root=?1",
            params![merkle_root],
            |row| {
                Ok(WitnessEvent {
                    merkle_root: row.get(0)?,
                    timestamp: row.get(1)?,
                    network: row.get(2)?,
                    contract_address: row.get(3)?,
                    transaction_hash: row.get(4)?,
                    sender_account_address: row.get(5)?,
                })
            },
        )
        .optional()?)
}

pub(crate) fn witness_root_users(conn: &Connection, merkle_root: &str) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM witnesses WHERE merkle_root=?1",
        params![merkle_root],
        |row| row.get(0),
    )?)
}

pub(crate) fn link(conn: &Connection, key: &PubkeyHash) -> Result<Option<LinkRecord>, StoreError> {
    let row = conn
        .query_row(
            "SELECT link_type, verification_hashes, file_hashes, reference_count \
             FROM links WHERE owner=?1 AND hash=?2",
            params![key.owner.as_str(), key.hash_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()?;
    match row {
        None => Ok(None),
        Some((link_type, verification_hashes, file_hashes, reference_count)) => {
            Ok(Some(LinkRecord {
                link_type,
                verification_hashes: serde_json::from_str(&verification_hashes)?,
                file_hashes: serde_json::from_str(&file_hashes)?,
                reference_count,
            }))
        }
    }
}

pub(crate) fn forms(conn: &Connection, key: &PubkeyHash) -> Result<Vec<FormField>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT key, value, field_type FROM aqua_forms WHERE owner=?1 AND hash=?2 ORDER BY id",
    )?;
    let fields = stmt
        .query_map(params![key.owner.as_str(), key.hash_str()], |row| {
            Ok(FormField {
                key: row.get(0)?,
                value: row.get(1)?,
                field_type: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(fields)
}

/// File hash the file index lists `key` under.
pub(crate) fn indexed_file_hash(
    conn: &Connection,
    key: &PubkeyHash,
) -> Result<Option<ContentHash>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT file_hash FROM file_index WHERE owner=?1 AND hash=?2 ORDER BY file_hash LIMIT 1",
            params![key.owner.as_str(), key.hash_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.map(ContentHash::new).transpose()?)
}

pub(crate) fn file_index_members(
    conn: &Connection,
    file_hash: &ContentHash,
) -> Result<Vec<PubkeyHash>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT owner, hash FROM file_index WHERE file_hash=?1 ORDER BY owner, hash")?;
    let rows = stmt
        .query_map(params![file_hash.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(owner, hash)| Ok(PubkeyHash::new(OwnerId::new(owner)?, ContentHash::new(hash)?)))
        .collect()
}

pub(crate) fn file(conn: &Connection, file_hash: &ContentHash) -> Result<Option<FileRecord>, StoreError> {
    let row = conn
        .query_row(
            "SELECT location, size, reference_count FROM files WHERE file_hash=?1",
            params![file_hash.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;
    Ok(row.map(|(location, size, reference_count)| FileRecord {
        file_hash: file_hash.clone(),
        location,
        size,
        reference_count,
    }))
}

pub(crate) fn file_name(conn: &Connection, key: &PubkeyHash) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT name FROM file_names WHERE owner=?1 AND hash=?2",
            params![key.owner.as_str(), key.hash_str()],
            |row| row.get(0),
        )
        .optional()?)
}

fn latest_from_parts(
    owner: String,
    hash: String,
    template_id: Option<String>,
    is_workflow: bool,
) -> Result<LatestEntry, StoreError> {
    Ok(LatestEntry {
        key: PubkeyHash::new(OwnerId::new(owner)?, ContentHash::new(hash)?),
        template_id,
        is_workflow,
    })
}

pub(crate) fn latest(conn: &Connection, key: &PubkeyHash) -> Result<Option<LatestEntry>, StoreError> {
    let row = conn
        .query_row(
            "SELECT owner, hash, template_id, is_workflow FROM latest WHERE owner=?1 AND hash=?2",
            params![key.owner.as_str(), key.hash_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;
    row.map(|(owner, hash, template_id, is_workflow)| {
        latest_from_parts(owner, hash, template_id, is_workflow)
    })
    .transpose()
}

pub(crate) fn latest_for_owner(conn: &Connection, owner: &OwnerId) -> Result<Vec<LatestEntry>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT owner, hash, template_id, is_workflow FROM latest WHERE owner=?1 ORDER BY hash",
    )?;
    let rows = stmt
        .query_map(params![owner.as_str()], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<Result<Vec<(String, String, Option<String>, bool)>, _>>()?;
    rows.into_iter()
        .map(|(owner, hash, template_id, is_workflow)| {
            latest_from_parts(owner, hash, template_id, is_workflow)
        })
        .collect()
}

pub(crate) fn contracts_for_sender(
    conn: &Connection,
    sender: &OwnerId,
) -> Result<Vec<ContractRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, sender, receiver, genesis_hash, latest_hash FROM contracts \
         WHERE sender=?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![sender.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(id, sender, receiver, genesis_hash, latest_hash)| {
            Ok(ContractRecord {
                id,
                sender: OwnerId::new(sender)?,
                receiver: receiver.map(OwnerId::new).transpose()?,
                genesis_hash,
                latest_hash,
            })
        })
        .collect()
}

pub(crate) fn owner_version(conn: &Connection, owner: &OwnerId) -> Result<u64, StoreError> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT version FROM owner_versions WHERE owner=?1",
            params![owner.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.unwrap_or(0).max(0) as u64)
}
