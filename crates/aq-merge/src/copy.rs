//! Re-keying one owner's revisions under another owner.

use aq_chain::{ProvenanceError, Result};
use aq_core::{AquaTree, LatestEntry, OwnerId, PubkeyHash, Revision, RevisionType};
use aq_store::{Reader, StoreTx};
use tracing::debug;

/// Where a tree's revisions come from and go to.
pub(crate) struct Rekey<'a> {
    pub source: &'a OwnerId,
    pub target: &'a OwnerId,
}

impl Rekey<'_> {
    pub fn source_key(&self, hash: &str) -> Result<PubkeyHash> {
        Ok(PubkeyHash::parse_or_inherit(hash, self.source)?)
    }

    pub fn target_key(&self, hash: &str) -> Result<PubkeyHash> {
        Ok(PubkeyHash::parse_or_inherit(hash, self.target)?)
    }

    /// Source-owned pointers move to the target; anything else passes through.
    fn previous(&self, previous: &Option<PubkeyHash>) -> Option<PubkeyHash> {
        match previous {
            Some(prev) if prev.owner == *self.source => Some(prev.with_owner(self.target)),
            other => other.clone(),
        }
    }

    /// Source revisions of `tree` in genesis-first order.
    ///
    /// `Ok(None)` when none of the tree belongs to the source: it is someone
    /// else's chain. A tree only partly present is an error.
    pub fn source_revisions(&self, tx: &StoreTx<'_>, tree: &AquaTree) -> Result<Option<Vec<Revision>>> {
        let mut found = Vec::new();
        let mut missing = None;
        for hash in tree.ordered_hashes() {
            let key = self.source_key(&hash)?;
            match tx.revision(&key)? {
                Some(rev) => found.push(rev),
                None => {
                    missing.get_or_insert(key);
                }
            }
        }
        match (found.is_empty(), missing) {
            (true, _) => Ok(None),
            (false, Some(key)) => Err(ProvenanceError::NotFound(key)),
            (false, None) => Ok(Some(found)),
        }
    }

    /// Copy `src` and its side records under the target owner.
    pub fn copy(&self, tx: &StoreTx<'_>, src: &Revision, tree: &AquaTree) -> Result<PubkeyHash> {
        let key = src.key.with_owner(self.target);
        tx.insert_revision(&Revision {
            key: key.clone(),
            revision_type: src.revision_type,
            previous: self.previous(&src.previous),
            children: Vec::new(),
            local_timestamp: src.local_timestamp.clone(),
            has_content: src.has_content,
            verification_leaves: src.verification_leaves.clone(),
            obsolete: false,
        })?;

        let missing = |what: &str| {
            ProvenanceError::ChainIntegrity {
                key: src.key.clone(),
                reason: format!("{} revision has no {what} record", src.revision_type),
            }
        };
        match src.revision_type {
            RevisionType::File => {}
            RevisionType::Form => tx.insert_forms(&key, &tx.forms(&src.key)?)?,
            RevisionType::Signature => {
                let sig = tx.signature(&src.key)?.ok_or_else(|| missing("signature"))?;
                tx.insert_signature(&key, &sig)?;
            }
            RevisionType::Witness => {
                let witness = tx.witness(&src.key)?.ok_or_else(|| missing("witness"))?;
                tx.insert_witness(&key, &witness.merkle_root)?;
            }
            RevisionType::Link => {
                let link = tx.link(&src.key)?.ok_or_else(|| missing("link"))?;
                tx.insert_link(&key, &link)?;
            }
        }

        if let Some(file_hash) = tx.indexed_file_hash(&src.key)? {
            tx.attach_file(&file_hash, &key)?;
            let name = match tree.file_index.get(src.key.hash_str()) {
                Some(name) => Some(name.clone()),
                None => tx.file_name(&src.key)?,
            };
            if let Some(name) = name {
                tx.set_file_name(&key, &name)?;
            }
        }

        debug!(from = %src.key, to = %key, "revision copied");
        Ok(key)
    }

    /// Make `tip` the target's only head among `chain`, tagged like the
    /// source's head when it has one.
    pub fn settle_latest(&self, tx: &StoreTx<'_>, chain: &[PubkeyHash], tip: &PubkeyHash) -> Result<()> {
        let mut tag = tx.latest(&tip.with_owner(self.source))?;
        for key in chain {
            if let Some(entry) = tx.latest(key)? {
                if tag.is_none() {
                    tag = Some(entry);
                }
                tx.delete_latest(key)?;
            }
        }
        let (template_id, is_workflow) = tag
            .map(|entry| (entry.template_id, entry.is_workflow))
            .unwrap_or((None, false));
        tx.upsert_latest(&LatestEntry {
            key: tip.clone(),
            template_id,
            is_workflow,
        })?;
        Ok(())
    }
}
