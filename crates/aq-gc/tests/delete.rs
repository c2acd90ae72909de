use aq_core::{
    ContentHash, FormField, LinkRecord, OwnerId, PubkeyHash, SignatureRecord, WitnessEvent,
};
use aq_gc::{can_delete, GcEngine};
use aq_chain::ProvenanceError;
use aq_store::{
    BlobStorage, FileAttachment, FsBlobStore, NewRevision, Reader, RevisionBody, Store,
};
use camino::Utf8PathBuf;

struct Fixture {
    _dir: tempfile::TempDir,
    store: Store,
    blobs: FsBlobStore,
}

fn owner(raw: &str) -> OwnerId {
    OwnerId::new(raw).unwrap()
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().join("blobs")).unwrap();
        Self {
            _dir: dir,
            store: Store::open_in_memory().unwrap(),
            blobs: FsBlobStore::new(root),
        }
    }

    fn file(&mut self, who: &str, name: &str, bytes: &[u8]) -> PubkeyHash {
        let blob = self.blobs.put(bytes).unwrap();
        self.append(
            who,
            None,
            RevisionBody::File(FileAttachment {
                file_hash: blob.file_hash,
                name: name.to_string(),
                location: blob.location,
                size: blob.size,
            }),
        )
    }

    fn append(&mut self, who: &str, previous: Option<&PubkeyHash>, body: RevisionBody) -> PubkeyHash {
        self.store
            .append(&NewRevision::new(owner(who), previous.cloned(), body))
            .unwrap()
    }

    fn witness(&mut self, previous: &PubkeyHash, root: &str) -> PubkeyHash {
        self.append(
            previous.owner.as_str(),
            Some(previous),
            RevisionBody::Witness(WitnessEvent {
                merkle_root: root.to_string(),
                timestamp: "1700000000".to_string(),
                network: "sepolia".to_string(),
                contract_address: "0xcontract".to_string(),
                transaction_hash: format!("0xtx{}", previous.hash_str()),
                sender_account_address: previous.owner.to_string(),
            }),
        )
    }

    fn gc(&mut self) -> GcEngine<'_> {
        GcEngine::new(&mut self.store, &self.blobs)
    }
}

#[test]
fn test_delete_genesis_only_revision() {
    let mut fx = Fixture::new();
    let alice = owner("0xalice");
    let g = fx.file("0xalice", "doc.txt", b"document");
    let file_hash = fx.store.indexed_file_hash(&g).unwrap().unwrap();
    let location = fx.store.file(&file_hash).unwrap().unwrap().location;

    let report = fx.gc().delete_revision(&g, &alice).unwrap();

    assert_eq!(report.deleted, vec![g.clone()]);
    assert_eq!(report.latest_removed, 1);
    assert_eq!(report.files_collected, vec![file_hash.clone()]);
    assert_eq!(report.freed[&alice].bytes, 8);
    assert!(fx.store.revision(&g).unwrap().is_none());
    assert!(fx.store.latest(&g).unwrap().is_none());
    assert!(fx.store.file(&file_hash).unwrap().is_none());
    assert!(fx.store.file_index_members(&file_hash).unwrap().is_empty());
    assert_eq!(fx.blobs.size(&location).unwrap(), None);
}

#[test]
fn test_shared_file_survives_one_delete() {
    let mut fx = Fixture::new();
    let a = fx.file("0xalice", "shared.txt", b"shared");
    let b = fx.file("0xbob", "shared.txt", b"shared");
    let file_hash = fx.store.indexed_file_hash(&a).unwrap().unwrap();

    let report = fx.gc().delete_revision(&a, &owner("0xalice")).unwrap();
    assert!(report.files_collected.is_empty());

    let record = fx.store.file(&file_hash).unwrap().unwrap();
    assert_eq!(record.reference_count, 1);
    assert_eq!(fx.store.file_index_members(&file_hash).unwrap(), vec![b]);
    assert_eq!(fx.blobs.size(&record.location).unwrap(), Some(6));
}

#[test]
fn test_delete_mid_chain_revision_repoints_latest() {
    let mut fx = Fixture::new();
    let alice = owner("0xalice");
    let g = fx.file("0xalice", "doc.txt", b"doc");
    let r1 = fx.append(
        "0xalice",
        Some(&g),
        RevisionBody::Form {
            fields: vec![FormField {
                key: "forms_title".to_string(),
                value: "Lease".to_string(),
                field_type: "string".to_string(),
            }],
            file: None,
        },
    );

    let report = fx.gc().delete_revision(&r1, &alice).unwrap();
    assert_eq!(report.latest_repointed, 1);
    assert_eq!(report.released.forms, 1);
    assert!(fx.store.latest(&g).unwrap().is_some());
    assert!(fx.store.forms(&r1).unwrap().is_empty());
}

#[test]
fn test_delete_parent_clears_previous_of_survivor() {
    let mut fx = Fixture::new();
    let alice = owner("0xalice");
    let g = fx.file("0xalice", "doc.txt", b"doc");
    let w = fx.witness(&g, "0xroot");

    let report = fx.gc().delete_revision(&g, &alice).unwrap();
    assert_eq!(report.previous_cleared, 1);
    assert!(fx.store.revision(&w).unwrap().unwrap().is_genesis());
}

#[test]
fn test_cascading_delete_keeps_shared_witness_event() {
    let mut fx = Fixture::new();
    let alice = owner("0xalice");
    let g = fx.file("0xalice", "a.txt", b"alice file");
    let w = fx.witness(&g, "0xshared-root");
    let s = fx.append(
        "0xalice",
        Some(&w),
        RevisionBody::Signature(SignatureRecord {
            digest: "0xsig".to_string(),
            wallet_address: "0xalice".to_string(),
            public_key: "0xpub".to_string(),
            signature_type: "ethereum:eip-191".to_string(),
            reference_count: 1,
        }),
    );
    let other = fx.file("0xbob", "b.txt", b"bob file");
    let other_w = fx.witness(&other, "0xshared-root");

    let report = fx.gc().delete_chain(&w, &alice).unwrap();

    assert_eq!(report.deleted.len(), 3);
    assert_eq!(report.deleted[0], s);
    assert_eq!(report.released.signatures, 1);
    assert_eq!(report.released.witnesses, 1);
    assert_eq!(report.witness_events_removed, 0);
    assert!(fx.store.witness_event("0xshared-root").unwrap().is_some());
    assert!(fx.store.witness(&other_w).unwrap().is_some());
    assert!(fx.store.latest_for_owner(&alice).unwrap().is_empty());

    fx.gc().delete_chain(&other, &owner("0xbob")).unwrap();
    assert!(fx.store.witness_event("0xshared-root").unwrap().is_none());
}

#[test]
fn test_cascading_delete_covers_forks_and_contracts() {
    let mut fx = Fixture::new();
    let alice = owner("0xalice");
    let g = fx.file("0xalice", "doc.txt", b"doc");
    let link = |target: &str| {
        RevisionBody::Link(LinkRecord {
            link_type: "aqua".to_string(),
            verification_hashes: vec![target.to_string()],
            file_hashes: Vec::new(),
            reference_count: 1,
        })
    };
    let a = fx.append("0xalice", Some(&g), link("0xone"));
    let b = fx.append("0xalice", Some(&g), link("0xtwo"));
    fx.store
        .write(|tx| {
            tx.add_contract(&alice, Some(&owner("0xbob")), g.hash_str(), a.hash_str())?;
            tx.add_contract(&owner("0xbob"), None, g.hash_str(), b.hash_str())
        })
        .unwrap();

    let report = fx.gc().delete_chain(&g, &alice).unwrap();
    assert_eq!(report.deleted.len(), 3);
    assert_eq!(report.released.links, 2);
    assert_eq!(report.contracts_removed, 1);
    assert_eq!(fx.store.owner_revision_count(&alice).unwrap(), 0);
    assert_eq!(
        fx.store.contracts_for_sender(&owner("0xbob")).unwrap().len(),
        1
    );
}

#[test]
fn test_non_owner_cannot_delete() {
    let mut fx = Fixture::new();
    let g = fx.file("0xalice", "doc.txt", b"doc");
    let mallory = owner("0xmallory");

    assert!(!can_delete(&fx.store, &g, &mallory).unwrap());
    assert!(can_delete(&fx.store, &g, &owner("0xalice")).unwrap());
    assert!(matches!(
        fx.gc().delete_chain(&g, &mallory),
        Err(ProvenanceError::Unauthorized { .. })
    ));
    assert!(fx.store.revision(&g).unwrap().is_some());
}

#[test]
fn test_delete_missing_revision_is_not_found() {
    let mut fx = Fixture::new();
    let key = PubkeyHash::new(owner("0xalice"), ContentHash::new("0xgone").unwrap());
    assert!(matches!(
        fx.gc().delete_revision(&key, &owner("0xalice")),
        Err(ProvenanceError::NotFound(_))
    ));
}

#[test]
fn test_report_serializes() {
    let mut fx = Fixture::new();
    let g = fx.file("0xalice", "doc.txt", b"doc");
    let report = fx.gc().delete_revision(&g, &owner("0xalice")).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["freed"]["0xalice"]["files"], 1);
}

#[test]
fn test_failed_delete_rolls_back_everything() {
    let mut fx = Fixture::new();
    let alice = owner("0xalice");
    let g = fx.file("0xalice", "doc.txt", b"doc");
    let w = fx.witness(&g, "0xroot");
    let file_hash = fx.store.indexed_file_hash(&g).unwrap().unwrap();
    let location = fx.store.file(&file_hash).unwrap().unwrap().location;
    let version = fx.store.owner_version(&alice).unwrap();

    fx.store
        .conn()
        .execute_batch(
            "CREATE TRIGGER refuse_revision_delete BEFORE DELETE ON revisions
             BEGIN SELECT RAISE(ABORT, 'refused'); END;",
        )
        .unwrap();

    let result = fx.gc().delete_chain(&g, &alice);
    assert!(matches!(result, Err(ProvenanceError::TransactionFailure(_))));

    assert!(fx.store.revision(&g).unwrap().is_some());
    assert!(fx.store.revision(&w).unwrap().is_some());
    assert!(fx.store.witness(&w).unwrap().is_some());
    assert!(fx.store.witness_event("0xroot").unwrap().is_some());
    assert_eq!(fx.store.file(&file_hash).unwrap().unwrap().reference_count, 1);
    assert_eq!(fx.store.file_index_members(&file_hash).unwrap(), vec![g.clone()]);
    assert!(fx.store.latest(&w).unwrap().is_some());
    assert_eq!(fx.store.owner_version(&alice).unwrap(), version);
    assert_eq!(fx.blobs.size(&location).unwrap(), Some(3));
}
