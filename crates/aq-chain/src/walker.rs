//! Chain traversal over `previous` pointers.
//!
//! All walks are iterative. A `previous` stored as a bare hash already
//! inherits the owner of the revision holding it (see `aq_store`), so the
//! walker only ever sees qualified keys.

use aq_core::{PubkeyHash, Revision};
use aq_store::Reader;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::{ProvenanceError, Result};

/// Revisions from `head` back to genesis, head first.
///
/// A `previous` that points at nothing, or at a revision already walked, is a
/// [`ProvenanceError::ChainIntegrity`] error.
pub fn walk<R: Reader + ?Sized>(reader: &R, head: &PubkeyHash) -> Result<Vec<Revision>> {
    let first = reader
        .revision(head)?
        .ok_or_else(|| ProvenanceError::NotFound(head.clone()))?;

    let mut seen: HashSet<PubkeyHash> = HashSet::new();
    seen.insert(first.key.clone());
    let mut chain = vec![first];

    while let Some(previous) = chain.last().and_then(|rev| rev.previous.clone()) {
        let current = &chain[chain.len() - 1].key;
        if !seen.insert(previous.clone()) {
            return Err(ProvenanceError::integrity(
                current,
                format!("previous {previous} forms a cycle"),
            ));
        }
        let Some(parent) = reader.revision(&previous)? else {
            return Err(ProvenanceError::integrity(
                current,
                format!("previous {previous} does not exist"),
            ));
        };
        chain.push(parent);
    }

    debug!(%head, len = chain.len(), "walked chain");
    Ok(chain)
}

/// Same as [`walk`], genesis first.
pub fn walk_from_genesis<R: Reader + ?Sized>(reader: &R, head: &PubkeyHash) -> Result<Vec<Revision>> {
    let mut chain = walk(reader, head)?;
    chain.reverse();
    Ok(chain)
}

fn live_children<R: Reader + ?Sized>(reader: &R, key: &PubkeyHash) -> Result<Vec<Revision>> {
    Ok(reader
        .children(key)?
        .into_iter()
        .filter(|child| child.key.owner == key.owner && !child.obsolete)
        .collect())
}

/// Newest descendant of `key` on its own owner's chain.
///
/// On a fork the smallest child key is followed. Obsolete revisions are
/// skipped.
pub fn walk_forward<R: Reader + ?Sized>(reader: &R, key: &PubkeyHash) -> Result<PubkeyHash> {
    if reader.revision(key)?.is_none() {
        return Err(ProvenanceError::NotFound(key.clone()));
    }
    let mut seen: HashSet<PubkeyHash> = HashSet::new();
    let mut current = key.clone();
    seen.insert(current.clone());

    loop {
        let next = live_children(reader, &current)?.into_iter().next();
        match next {
            None => return Ok(current),
            Some(child) => {
                if !seen.insert(child.key.clone()) {
                    return Err(ProvenanceError::integrity(&child.key, "children form a cycle"));
                }
                current = child.key;
            }
        }
    }
}

/// Chain linearized from `genesis` forward.
///
/// Fails with [`ProvenanceError::DivergenceAmbiguous`] if any revision has more
/// than one live child.
pub fn order_from_genesis<R: Reader + ?Sized>(reader: &R, genesis: &PubkeyHash) -> Result<Vec<Revision>> {
    let first = reader
        .revision(genesis)?
        .ok_or_else(|| ProvenanceError::NotFound(genesis.clone()))?;
    let mut seen: HashSet<PubkeyHash> = HashSet::new();
    seen.insert(first.key.clone());
    let mut ordered = vec![first];

    loop {
        let tail = &ordered[ordered.len() - 1].key;
        let mut children = live_children(reader, tail)?;
        match children.len() {
            0 => return Ok(ordered),
            1 => {
                let child = children.remove(0);
                if !seen.insert(child.key.clone()) {
                    return Err(ProvenanceError::integrity(&child.key, "children form a cycle"));
                }
                ordered.push(child);
            }
            _ => return Err(ProvenanceError::DivergenceAmbiguous(tail.clone())),
        }
    }
}

/// A member of a connected set with its distance from genesis.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedRevision {
    pub revision: Revision,
    pub depth: usize,
}

/// Every revision connected to `key`: its ancestors back to genesis plus all
/// same-owner descendants of any of them, obsolete ones included.
///
/// Computed to a fixpoint with a queue. Ordered by depth, then key.
pub fn connected_set<R: Reader + ?Sized>(reader: &R, key: &PubkeyHash) -> Result<Vec<ConnectedRevision>> {
    let ancestors = walk_from_genesis(reader, key)?;
    let mut depths: HashMap<PubkeyHash, usize> = HashMap::new();
    let mut members: Vec<ConnectedRevision> = Vec::new();
    let mut queue: VecDeque<PubkeyHash> = VecDeque::new();

    for (depth, revision) in ancestors.into_iter().enumerate() {
        depths.insert(revision.key.clone(), depth);
        queue.push_back(revision.key.clone());
        members.push(ConnectedRevision { revision, depth });
    }

    while let Some(current) = queue.pop_front() {
        let depth = depths.get(&current).copied().unwrap_or_default();
        for child in reader.children(&current)? {
            if child.key.owner != current.owner || depths.contains_key(&child.key) {
                continue;
            }
            depths.insert(child.key.clone(), depth + 1);
            queue.push_back(child.key.clone());
            members.push(ConnectedRevision {
                revision: child,
                depth: depth + 1,
            });
        }
    }

    members.sort_by(|a, b| {
        a.depth
            .cmp(&b.depth)
            .then_with(|| a.revision.key.cmp(&b.revision.key))
    });
    debug!(%key, len = members.len(), "computed connected set");
    Ok(members)
}
