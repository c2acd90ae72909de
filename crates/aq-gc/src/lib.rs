//! Deletion of revisions and whole chains with shared-resource bookkeeping.
//!
//! Signature, witness and link rows are released through the store's
//! reference-count ledger, files are detached from the file index and
//! collected once nothing refers to them, and orphaned witness events,
//! head pointers and share contracts are cleaned up. Every delete runs in one
//! transaction; blob bytes are removed only after it commits.

mod report;

pub use report::{DeleteReport, FreedUsage, ReleasedRecords};

use aq_chain::{connected_set, ProvenanceError, Result};
use aq_core::{ContentHash, OwnerId, PubkeyHash, Revision};
use aq_store::{BlobStorage, FileDetach, Reader, Release, SharedRecord, Store, StoreTx};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Whether `actor` may delete `key`: the revision exists and `actor` owns it.
pub fn can_delete<R: Reader + ?Sized>(reader: &R, key: &PubkeyHash, actor: &OwnerId) -> Result<bool> {
    Ok(key.owner == *actor && reader.revision(key)?.is_some())
}

fn authorize(key: &PubkeyHash, actor: &OwnerId) -> Result<()> {
    if key.owner != *actor {
        return Err(ProvenanceError::Unauthorized {
            actor: actor.clone(),
            key: key.clone(),
        });
    }
    Ok(())
}

/// Deletes revisions from a [`Store`], removing collected blobs from `blobs`.
pub struct GcEngine<'a> {
    store: &'a mut Store,
    blobs: &'a dyn BlobStorage,
}

impl<'a> GcEngine<'a> {
    pub fn new(store: &'a mut Store, blobs: &'a dyn BlobStorage) -> Self {
        Self { store, blobs }
    }

    /// Delete one revision.
    ///
    /// Children survive with their `previous` cleared; the revision's Latest
    /// entry moves back to its parent when there is one.
    pub fn delete_revision(&mut self, key: &PubkeyHash, actor: &OwnerId) -> Result<DeleteReport> {
        authorize(key, actor)?;
        let (report, locations) = self
            .store
            .write(|tx| {
                let revision = tx
                    .revision(key)?
                    .ok_or_else(|| ProvenanceError::NotFound(key.clone()))?;
                purge(tx, vec![revision], actor)
            })
            .map_err(ProvenanceError::rolled_back)?;
        let report = self.remove_blobs(report, locations);
        info!(action = "delete_revision", %key, %actor, "revision deleted");
        Ok(report)
    }

    /// Delete every revision connected to `key`: its ancestors and all of
    /// their descendants owned by `actor`.
    pub fn delete_chain(&mut self, key: &PubkeyHash, actor: &OwnerId) -> Result<DeleteReport> {
        authorize(key, actor)?;
        let (report, locations) = self
            .store
            .write(|tx| {
                let mut members = connected_set(tx, key)?;
                members.retain(|member| member.revision.key.owner == *actor);
                members.sort_by(|a, b| {
                    b.depth
                        .cmp(&a.depth)
                        .then_with(|| a.revision.key.cmp(&b.revision.key))
                });
                let revisions = members.into_iter().map(|member| member.revision).collect();
                purge(tx, revisions, actor)
            })
            .map_err(ProvenanceError::rolled_back)?;
        let report = self.remove_blobs(report, locations);
        info!(
            action = "delete_chain",
            %key,
            %actor,
            revisions = report.deleted.len(),
            files = report.files_collected.len(),
            "chain deleted"
        );
        Ok(report)
    }

    fn remove_blobs(&self, mut report: DeleteReport, locations: Vec<(ContentHash, String)>) -> DeleteReport {
        for (file_hash, location) in locations {
            match self.blobs.remove(&location) {
                Ok(_) => debug!(%file_hash, %location, "blob removed"),
                Err(err) => {
                    warn!(%file_hash, %location, error = %err, "blob removal failed");
                    report.blobs_left_behind.push(file_hash);
                }
            }
        }
        report
    }
}

/// Remove `revisions` (deepest first) inside an open transaction.
/// Returns the report and the blob locations to delete after commit.
fn purge(
    tx: &StoreTx<'_>,
    revisions: Vec<Revision>,
    actor: &OwnerId,
) -> Result<(DeleteReport, Vec<(ContentHash, String)>)> {
    let mut report = DeleteReport::default();
    let mut locations: Vec<(ContentHash, String)> = Vec::new();
    let mut merkle_roots: BTreeSet<String> = BTreeSet::new();
    let doomed: HashSet<PubkeyHash> = revisions.iter().map(|rev| rev.key.clone()).collect();

    // Side records and files.
    for rev in &revisions {
        let key = &rev.key;
        if let Some(witness) = tx.witness(key)? {
            merkle_roots.insert(witness.merkle_root);
        }
        if tx.release(SharedRecord::Signature, key)? != Release::Missing {
            report.released.signatures += 1;
        }
        if tx.release(SharedRecord::Witness, key)? != Release::Missing {
            report.released.witnesses += 1;
        }
        if tx.release(SharedRecord::Link, key)? != Release::Missing {
            report.released.links += 1;
        }
        report.released.forms += tx.delete_forms(key)?;

        while let Some(file_hash) = tx.indexed_file_hash(key)? {
            let size = tx.file(&file_hash)?.map_or(0, |record| record.size);
            match tx.detach_file(&file_hash, key)? {
                FileDetach::Missing => break,
                FileDetach::Detached { .. } => report.free(&key.owner, size),
                FileDetach::Collected(record) => {
                    report.free(&key.owner, size);
                    report.files_collected.push(file_hash.clone());
                    locations.push((file_hash, record.location));
                }
            }
        }
        if tx.delete_file_name(key)? {
            report.released.file_names += 1;
        }
    }

    // Witness events nobody points at any more.
    for root in &merkle_roots {
        if tx.collect_witness_event(root)? {
            report.witness_events_removed += 1;
        }
    }

    // Survivors lose their pointer into the deleted set.
    for key in &doomed {
        let survivors = tx
            .child_keys(key)?
            .into_iter()
            .filter(|child| !doomed.contains(child))
            .count();
        if survivors > 0 {
            debug!(parent = %key, survivors, "clearing previous of survivors");
            tx.clear_previous_refs(key)?;
            report.previous_cleared += survivors;
        }
    }

    // Head pointers and share contracts.
    for rev in &revisions {
        if tx.latest(&rev.key)?.is_none() {
            continue;
        }
        match &rev.previous {
            Some(previous)
                if previous.owner == rev.key.owner
                    && !doomed.contains(previous)
                    && tx.revision(previous)?.is_some() =>
            {
                tx.move_latest(Some(&rev.key), previous)?;
                report.latest_repointed += 1;
            }
            _ => {
                tx.delete_latest(&rev.key)?;
                report.latest_removed += 1;
            }
        }
    }
    let doomed_hashes: HashSet<&str> = doomed.iter().map(PubkeyHash::hash_str).collect();
    for contract in tx.contracts_for_sender(actor)? {
        if doomed_hashes.contains(contract.genesis_hash.as_str())
            || doomed_hashes.contains(contract.latest_hash.as_str())
        {
            tx.delete_contract(contract.id)?;
            report.contracts_removed += 1;
        }
    }

    for rev in revisions {
        tx.delete_revision_row(&rev.key)?;
        report.deleted.push(rev.key);
    }
    tx.bump_owner_version(actor)?;
    Ok((report, locations))
}
