//! Transfer and merge of assembled chains between owners.
//!
//! Given an [`AquaTree`] fetched from a source owner, [`MergeEngine::transfer`]
//! copies every revision the target does not already have, re-keyed to the
//! target, and [`MergeEngine::merge`] reconciles it with a chain the target
//! already holds. Linked chains are handled with the same call. Each
//! operation is one transaction and can be guarded by the target's expected
//! owner version.

mod copy;

use aq_chain::{order_from_genesis, ProvenanceError, Result};
use aq_core::{AquaTree, OwnerId, PubkeyHash};
use aq_store::{Reader, Store, StoreTx};
use copy::Rekey;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// How to reconcile an incoming chain that diverges from the target's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Hide the target's divergent tail and continue on the incoming one.
    Replace,
    /// Keep both tails; the target ends up with two heads.
    Fork,
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "replace" => Ok(MergeStrategy::Replace),
            "fork" => Ok(MergeStrategy::Fork),
            other => Err(format!("unknown merge strategy '{other}' (expected replace or fork)")),
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MergeStrategy::Replace => "replace",
            MergeStrategy::Fork => "fork",
        })
    }
}

/// Which case a merge fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Target had nothing at this genesis.
    FullTransfer,
    /// Target was a prefix of the incoming chain.
    SimpleAddition,
    Replaced,
    Forked,
    /// Incoming chain was already contained in the target's.
    NoOp,
    /// No revision of the tree belongs to the source; left alone.
    External,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub transferred: Vec<PubkeyHash>,
    /// Linked chains copied along with the root.
    pub linked_chains: usize,
    pub latest: Option<PubkeyHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub outcome: MergeOutcome,
    pub imported: Vec<PubkeyHash>,
    pub latest: Option<PubkeyHash>,
    pub nested: Vec<MergeReport>,
}

/// Runs transfers and merges against a [`Store`].
pub struct MergeEngine<'a> {
    store: &'a mut Store,
}

fn check_version(tx: &StoreTx<'_>, owner: &OwnerId, expected: Option<u64>) -> Result<()> {
    if let Some(expected) = expected {
        let actual = tx.owner_version(owner)?;
        if actual != expected {
            return Err(ProvenanceError::Conflict {
                owner: owner.clone(),
                expected,
                actual,
            });
        }
    }
    Ok(())
}

impl<'a> MergeEngine<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// Copy `tree` from `source` to `target`.
    ///
    /// Revisions the target already holds are skipped. The target ends with
    /// one Latest entry per chain, at its tip.
    pub fn transfer(
        &mut self,
        tree: &AquaTree,
        target: &OwnerId,
        source: &OwnerId,
        expected_target_version: Option<u64>,
    ) -> Result<TransferReport> {
        let rekey = Rekey { source, target };
        let report = self
            .store
            .write(|tx| {
                check_version(tx, target, expected_target_version)?;
                let mut report = TransferReport::default();
                let mut pending: Vec<(&AquaTree, bool)> = vec![(tree, true)];
                while let Some((chain, is_root)) = pending.pop() {
                    if let Some(chains) = &chain.linked_chains {
                        pending.extend(chains.values().map(|sub| (sub, false)));
                    }
                    let Some((imported, latest)) = transfer_chain(tx, &rekey, chain)? else {
                        continue;
                    };
                    report.transferred.extend(imported);
                    if is_root {
                        report.latest = latest;
                    } else {
                        report.linked_chains += 1;
                    }
                }
                tx.bump_owner_version(target)?;
                Ok(report)
            })
            .map_err(ProvenanceError::rolled_back)?;

        info!(
            action = "transfer",
            %source,
            %target,
            revisions = report.transferred.len(),
            linked = report.linked_chains,
            "chain transferred"
        );
        Ok(report)
    }

    /// Merge `tree` from `source` into the chain `target` holds at the same
    /// genesis.
    pub fn merge(
        &mut self,
        tree: &AquaTree,
        target: &OwnerId,
        source: &OwnerId,
        strategy: MergeStrategy,
        expected_target_version: Option<u64>,
    ) -> Result<MergeReport> {
        let rekey = Rekey { source, target };
        let report = self
            .store
            .write(|tx| {
                check_version(tx, target, expected_target_version)?;
                let report = merge_chain(tx, &rekey, tree, strategy)?;
                tx.bump_owner_version(target)?;
                Ok(report)
            })
            .map_err(ProvenanceError::rolled_back)?;

        info!(
            action = "merge",
            %source,
            %target,
            %strategy,
            outcome = ?report.outcome,
            imported = report.imported.len(),
            "chain merged"
        );
        Ok(report)
    }
}

/// Transfer one chain, without its linked chains. `None` for external chains.
fn transfer_chain(
    tx: &StoreTx<'_>,
    rekey: &Rekey<'_>,
    tree: &AquaTree,
) -> Result<Option<(Vec<PubkeyHash>, Option<PubkeyHash>)>> {
    let Some(revisions) = rekey.source_revisions(tx, tree)? else {
        debug!(genesis = ?tree.genesis_hash(), "skipping chain not owned by source");
        return Ok(None);
    };

    let mut imported = Vec::new();
    let mut chain = Vec::with_capacity(revisions.len());
    for src in &revisions {
        let key = src.key.with_owner(rekey.target);
        if tx.revision(&key)?.is_none() {
            imported.push(rekey.copy(tx, src, tree)?);
        }
        chain.push(key);
    }

    let latest = match tree.latest_hash() {
        Some(tip) => {
            let tip = rekey.target_key(tip)?;
            rekey.settle_latest(tx, &chain, &tip)?;
            Some(tip)
        }
        None => None,
    };
    Ok(Some((imported, latest)))
}

fn merge_chain(
    tx: &StoreTx<'_>,
    rekey: &Rekey<'_>,
    tree: &AquaTree,
    strategy: MergeStrategy,
) -> Result<MergeReport> {
    let mut report = merge_one(tx, rekey, tree, strategy)?;
    if report.outcome != MergeOutcome::External {
        if let Some(chains) = &tree.linked_chains {
            for sub in chains.values().filter(|sub| !sub.is_empty()) {
                report.nested.push(merge_chain(tx, rekey, sub, strategy)?);
            }
        }
    }
    Ok(report)
}

fn merge_one(
    tx: &StoreTx<'_>,
    rekey: &Rekey<'_>,
    tree: &AquaTree,
    strategy: MergeStrategy,
) -> Result<MergeReport> {
    let report = |outcome: MergeOutcome, imported: Vec<PubkeyHash>, latest: Option<PubkeyHash>| MergeReport {
        outcome,
        imported,
        latest,
        nested: Vec::new(),
    };

    let Some(incoming) = rekey.source_revisions(tx, tree)? else {
        return Ok(report(MergeOutcome::External, Vec::new(), None));
    };
    let genesis = incoming[0].key.with_owner(rekey.target);
    if tx.revision(&genesis)?.is_none() {
        let (imported, latest) = transfer_chain(tx, rekey, tree)?.unwrap_or_default();
        return Ok(report(MergeOutcome::FullTransfer, imported, latest));
    }

    let existing = order_from_genesis(tx, &genesis)?;
    let common = existing
        .iter()
        .zip(&incoming)
        .take_while(|(have, new)| have.key.hash == new.key.hash)
        .count();
    let existing_keys: Vec<PubkeyHash> = existing.iter().map(|rev| rev.key.clone()).collect();
    let existing_tip = existing_keys.last().cloned();

    if common == incoming.len() {
        return Ok(report(MergeOutcome::NoOp, Vec::new(), existing_tip));
    }

    let outcome = if common == existing.len() {
        MergeOutcome::SimpleAddition
    } else {
        match strategy {
            MergeStrategy::Replace => {
                for rev in &existing[common..] {
                    tx.set_obsolete(&rev.key, true)?;
                }
                MergeOutcome::Replaced
            }
            MergeStrategy::Fork => MergeOutcome::Forked,
        }
    };

    let mut imported = Vec::new();
    let mut new_line = Vec::new();
    for src in &incoming[common..] {
        let key = src.key.with_owner(rekey.target);
        match tx.revision(&key)? {
            None => imported.push(rekey.copy(tx, src, tree)?),
            Some(present) if present.obsolete => tx.set_obsolete(&key, false)?,
            Some(_) => {}
        }
        new_line.push(key);
    }

    let tip = new_line
        .last()
        .cloned()
        .ok_or_else(|| ProvenanceError::NotFound(genesis.clone()))?;
    match outcome {
        // A fork keeps the existing head and adds a second one.
        MergeOutcome::Forked => rekey.settle_latest(tx, &new_line, &tip)?,
        _ => {
            let mut superseded = existing_keys;
            superseded.extend(new_line);
            rekey.settle_latest(tx, &superseded, &tip)?;
        }
    }
    Ok(report(outcome, imported, Some(tip)))
}
