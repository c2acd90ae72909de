//! Create, fetch, transfer, merge and delete across the engines.

use aq_chain::{walk, ProvenanceError};
use aq_core::{hash_only, ERROR_MARKER};
use aq_integration_tests::{owner, Fixture};
use aq_merge::{MergeOutcome, MergeStrategy};
use aq_store::{BlobStorage, Reader, Store};

#[test]
fn test_rewalk_is_stable() {
    let mut fx = Fixture::new();
    let alice = owner("0xalice");
    let g = fx.file(&alice, "deed.pdf", b"deed");
    let r1 = fx.form(&g, "signed");
    let r2 = fx.witness(&r1, "0xroot");

    let first = fx.tree(&r2);
    let second = fx.tree(&r2);
    assert_eq!(first.ordered_hashes(), second.ordered_hashes());
    assert_eq!(first.genesis_hash(), Some(g.hash_str()));
    assert_eq!(first.latest_hash(), Some(r2.hash_str()));
    assert_eq!(walk(&fx.store, &r2).unwrap().len(), 3);
}

#[test]
fn test_template_links_resolve_to_system_owner_and_survive_transfer() {
    let mut fx = Fixture::new();
    let system = fx.config.system_owner_id().unwrap();
    let template = fx.file(&system, "aqua_sign.json", b"{\"template\":\"aqua_sign\"}");
    fx.config.system_template_hashes = vec![template.hash_str().to_string()];

    let alice = owner("0xalice");
    let g = fx.file(&alice, "contract.pdf", b"contract");
    let link = fx.link(&g, template.hash_str());
    let tree = fx.tree(&link);
    assert_eq!(
        tree.file_index.get(template.hash_str()).map(String::as_str),
        Some("aqua_sign.json")
    );

    let bob = owner("0xbob");
    let report = fx.merge().transfer(&tree, &bob, &alice, None).unwrap();
    assert_eq!(report.linked_chains, 0);
    assert_eq!(report.transferred.len(), 2);
    assert!(fx.store.revision(&template.with_owner(&bob)).unwrap().is_none());
    assert_eq!(fx.tree(&link.with_owner(&bob)), tree);
}

#[test]
fn test_deleting_source_keeps_transferred_copy() {
    let mut fx = Fixture::new();
    let alice = owner("0xalice");
    let bob = owner("0xbob");
    let g = fx.file(&alice, "report.txt", b"quarterly report");
    let w = fx.witness(&g, "0xshared");
    let tree = fx.tree(&w);
    fx.merge().transfer(&tree, &bob, &alice, None).unwrap();

    let file_hash = fx.store.indexed_file_hash(&g).unwrap().unwrap();
    let location = fx.store.file(&file_hash).unwrap().unwrap().location;
    assert_eq!(fx.store.file(&file_hash).unwrap().unwrap().reference_count, 2);

    let report = fx.gc().delete_chain(&g, &alice).unwrap();
    assert_eq!(report.deleted.len(), 2);
    assert!(report.files_collected.is_empty());
    assert_eq!(report.witness_events_removed, 0);
    assert!(fx.store.witness_event("0xshared").unwrap().is_some());
    assert_eq!(fx.blobs.size(&location).unwrap(), Some(16));
    assert_eq!(fx.tree(&w.with_owner(&bob)), tree);

    let report = fx.gc().delete_chain(&w.with_owner(&bob), &bob).unwrap();
    assert_eq!(report.files_collected, vec![file_hash.clone()]);
    assert_eq!(report.witness_events_removed, 1);
    assert!(fx.store.file(&file_hash).unwrap().is_none());
    assert_eq!(fx.blobs.size(&location).unwrap(), None);
}

#[test]
fn test_replace_then_purge_removes_hidden_tail() {
    let mut fx = Fixture::new();
    let alice = owner("0xalice");
    let bob = owner("0xbob");
    let g = fx.file(&alice, "plan.md", b"plan");
    let r1 = fx.form(&g, "draft");
    let shared = fx.tree(&r1);
    fx.merge().transfer(&shared, &bob, &alice, None).unwrap();

    let bob_edit = fx.form(&r1.with_owner(&bob), "bob's draft");
    let r2 = fx.form(&r1, "final");
    let incoming = fx.tree(&r2);
    let report = fx
        .merge()
        .merge(&incoming, &bob, &alice, MergeStrategy::Replace, None)
        .unwrap();
    assert_eq!(report.outcome, MergeOutcome::Replaced);
    assert!(fx.store.revision(&bob_edit).unwrap().unwrap().obsolete);

    let purged = fx.gc().delete_chain(&g.with_owner(&bob), &bob).unwrap();
    assert_eq!(purged.deleted.len(), 4);
    assert_eq!(fx.store.owner_revision_count(&bob).unwrap(), 0);
    assert!(fx.store.latest_for_owner(&bob).unwrap().is_empty());
    assert_eq!(fx.store.owner_revision_count(&alice).unwrap(), 3);
}

#[test]
fn test_nested_linked_chain_merges_with_root() {
    let mut fx = Fixture::new();
    let alice = owner("0xalice");
    let bob = owner("0xbob");
    let annex = fx.file(&alice, "annex.txt", b"annex");
    let g = fx.file(&alice, "main.txt", b"main");
    let link = fx.link(&g, annex.hash_str());
    let tree = fx.tree(&link);

    let report = fx
        .merge()
        .merge(&tree, &bob, &alice, MergeStrategy::Fork, None)
        .unwrap();
    assert_eq!(report.outcome, MergeOutcome::FullTransfer);
    assert_eq!(report.nested.len(), 1);
    assert_eq!(report.nested[0].outcome, MergeOutcome::FullTransfer);
    assert_eq!(fx.store.latest_for_owner(&bob).unwrap().len(), 2);

    let again = fx
        .merge()
        .merge(&tree, &bob, &alice, MergeStrategy::Fork, None)
        .unwrap();
    assert_eq!(again.outcome, MergeOutcome::NoOp);
    assert_eq!(again.nested[0].outcome, MergeOutcome::NoOp);
}

#[test]
fn test_deleted_link_target_degrades_to_marker() {
    let mut fx = Fixture::new();
    let alice = owner("0xalice");
    let carol = owner("0xcarol");
    let target = fx.file(&carol, "id.txt", b"carol id");
    let g = fx.file(&alice, "doc.txt", b"doc");
    let link = fx.link(&g, &target.to_string());
    assert!(fx.tree(&link).linked_chains.is_some());

    fx.gc().delete_revision(&target, &carol).unwrap();
    let tree = fx.tree(&link);
    assert_eq!(
        tree.file_index.get(hash_only(&target.to_string())).map(String::as_str),
        Some(ERROR_MARKER)
    );
    assert!(tree.linked_chains.is_none());
}

#[test]
fn test_concurrent_writer_is_detected() {
    let mut fx = Fixture::file_backed();
    let alice = owner("0xalice");
    let bob = owner("0xbob");
    let g = fx.file(&alice, "doc.txt", b"doc");
    let tree = fx.tree(&g);
    let seen = fx.store.owner_version(&bob).unwrap();

    let mut second = Store::open(fx.database()).unwrap();
    second
        .write(|tx| tx.bump_owner_version(&bob).map(|_| ()))
        .unwrap();

    let result = fx.merge().transfer(&tree, &bob, &alice, Some(seen));
    match result {
        Err(ProvenanceError::Conflict {
            expected, actual, ..
        }) => {
            assert_eq!(expected, seen);
            assert_eq!(actual, seen + 1);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(fx.store.owner_revision_count(&bob).unwrap(), 0);
}

#[test]
fn test_tree_serializes_with_linked_chains() {
    let mut fx = Fixture::new();
    let alice = owner("0xalice");
    let annex = fx.file(&alice, "annex.txt", b"annex");
    let g = fx.file(&alice, "main.txt", b"main");
    let link = fx.link(&g, annex.hash_str());

    let json = serde_json::to_value(fx.tree(&link)).unwrap();
    let key = format!("{}_{}", link.hash_str(), annex.hash_str());
    assert!(json["linkedChains"][key.as_str()]["revisions"][annex.hash_str()].is_object());
    assert_eq!(json["file_index"][annex.hash_str()], "annex.txt");
    assert!(json.get("fileObjects").is_none());
}
