//! Turning walked revisions into an [`AquaTree`].

use aq_core::{hash_only, AquaTree, PubkeyHash, Revision, RevisionPayload, RevisionType, VERSION_TAG};
use aq_store::Reader;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::{ProvenanceError, Result};

/// Order revisions genesis first, whatever order they arrived in.
///
/// Roots are revisions whose `previous` is not in the set. When a revision
/// has several children in the set, the smaller key comes first and its line
/// is finished before the next one starts.
pub fn canonical_order(revisions: Vec<Revision>) -> Vec<Revision> {
    let present: HashSet<PubkeyHash> = revisions.iter().map(|rev| rev.key.clone()).collect();
    let mut children: HashMap<PubkeyHash, Vec<PubkeyHash>> = HashMap::new();
    let mut roots: Vec<PubkeyHash> = Vec::new();
    for rev in &revisions {
        match &rev.previous {
            Some(previous) if present.contains(previous) => {
                children.entry(previous.clone()).or_default().push(rev.key.clone());
            }
            _ => roots.push(rev.key.clone()),
        }
    }
    for list in children.values_mut() {
        list.sort();
    }
    roots.sort();

    let mut by_key: HashMap<PubkeyHash, Revision> = revisions
        .into_iter()
        .map(|rev| (rev.key.clone(), rev))
        .collect();
    let mut ordered = Vec::with_capacity(by_key.len());
    let mut stack: Vec<PubkeyHash> = roots.into_iter().rev().collect();
    while let Some(key) = stack.pop() {
        if let Some(list) = children.get(&key) {
            stack.extend(list.iter().rev().cloned());
        }
        if let Some(rev) = by_key.remove(&key) {
            ordered.push(rev);
        }
    }
    // Anything left sits on a cycle; keep it rather than drop it.
    let mut rest: Vec<Revision> = by_key.into_values().collect();
    rest.sort_by(|a, b| a.key.cmp(&b.key));
    ordered.extend(rest);
    ordered
}

fn missing(rev: &Revision, what: &str) -> ProvenanceError {
    ProvenanceError::integrity(&rev.key, format!("{} revision has no {what} record", rev.revision_type))
}

/// Serialized payload of one stored revision.
///
/// Signature, witness and link revisions must have their side record;
/// without one the chain is corrupt.
pub fn revision_payload<R: Reader + ?Sized>(reader: &R, rev: &Revision) -> Result<RevisionPayload> {
    let mut fields: BTreeMap<String, Value> = BTreeMap::new();

    if rev.revision_type.carries_file() {
        if let Some(file_hash) = reader.indexed_file_hash(&rev.key)? {
            fields.insert("file_hash".into(), json!(file_hash.as_str()));
        }
    }

    match rev.revision_type {
        RevisionType::File => {}
        RevisionType::Form => {
            for field in reader.forms(&rev.key)? {
                fields.insert(field.key, Value::String(field.value));
            }
        }
        RevisionType::Witness => {
            let witness = reader.witness(&rev.key)?.ok_or_else(|| missing(rev, "witness"))?;
            let event = reader
                .witness_event(&witness.merkle_root)?
                .ok_or_else(|| missing(rev, "witness event"))?;
            fields.insert("witness_merkle_root".into(), json!(event.merkle_root));
            fields.insert("witness_timestamp".into(), json!(event.timestamp));
            fields.insert("witness_network".into(), json!(event.network));
            fields.insert(
                "witness_smart_contract_address".into(),
                json!(event.contract_address),
            );
            fields.insert("witness_transaction_hash".into(), json!(event.transaction_hash));
            fields.insert(
                "witness_sender_account_address".into(),
                json!(event.sender_account_address),
            );
            fields.insert("witness_merkle_proof".into(), json!([event.merkle_root]));
        }
        RevisionType::Signature => {
            let sig = reader
                .signature(&rev.key)?
                .ok_or_else(|| missing(rev, "signature"))?;
            let signature = if sig.signature_type.contains("did") {
                serde_json::from_str(&sig.digest).unwrap_or_else(|_| json!(sig.digest))
            } else {
                json!(sig.digest)
            };
            fields.insert("signature".into(), signature);
            fields.insert("signature_public_key".into(), json!(sig.public_key));
            fields.insert("signature_wallet_address".into(), json!(sig.wallet_address));
            fields.insert("signature_type".into(), json!(sig.signature_type));
        }
        RevisionType::Link => {
            let link = reader.link(&rev.key)?.ok_or_else(|| missing(rev, "link"))?;
            fields.insert("link_type".into(), json!(link.link_type));
            fields.insert(
                "link_verification_hashes".into(),
                json!(link.verification_hashes),
            );
            fields.insert("link_file_hashes".into(), json!(link.file_hashes));
        }
    }

    Ok(RevisionPayload {
        revision_type: rev.revision_type,
        previous_verification_hash: rev
            .previous
            .as_ref()
            .map(|prev| prev.hash_str().to_string())
            .unwrap_or_default(),
        local_timestamp: rev.local_timestamp.clone(),
        version: VERSION_TAG.to_string(),
        leaves: (!rev.verification_leaves.is_empty()).then(|| rev.verification_leaves.clone()),
        fields,
    })
}

/// Build the tree of one chain. Linked chains and file objects are left out.
pub fn assemble<R: Reader + ?Sized>(reader: &R, revisions: Vec<Revision>) -> Result<AquaTree> {
    let mut tree = AquaTree::new();
    for rev in canonical_order(revisions) {
        let mut payload = revision_payload(reader, &rev)?;
        let hash = hash_only(rev.key.hash_str()).to_string();

        if rev.is_genesis() {
            if let Some(name) = reader.file_name(&rev.key)? {
                tree.file_index.insert(hash.clone(), name);
            } else {
                debug!(key = %rev.key, "genesis has no file name");
            }
            if !payload.fields.contains_key("file_hash") {
                if let Some(file_hash) = reader.indexed_file_hash(&rev.key)? {
                    payload
                        .fields
                        .insert("file_hash".into(), json!(file_hash.as_str()));
                }
            }
        }
        tree.revisions.insert(hash, payload);
    }
    Ok(tree)
}
