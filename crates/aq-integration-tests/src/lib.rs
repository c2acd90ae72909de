//! Shared fixture for the cross-crate tests under `tests/`.

use aq_chain::{FetchOptions, TreeFetcher};
use aq_core::{AquaTree, EngineConfig, FormField, LinkRecord, OwnerId, PubkeyHash, WitnessEvent};
use aq_gc::GcEngine;
use aq_merge::MergeEngine;
use aq_store::{BlobStorage, FileAttachment, FsBlobStore, NewRevision, RevisionBody, Store};
use camino::Utf8PathBuf;
use tempfile::TempDir;

pub fn owner(raw: &str) -> OwnerId {
    OwnerId::new(raw).unwrap()
}

/// A store (in memory or file backed) with a blob directory in a scratch dir.
pub struct Fixture {
    pub dir: TempDir,
    pub store: Store,
    pub blobs: FsBlobStore,
    pub config: EngineConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_store(|_| Store::open_in_memory().unwrap())
    }

    /// Backed by `aqua.db` in the scratch dir, so other handles can open it.
    pub fn file_backed() -> Self {
        Self::with_store(|dir| Store::open(dir.path().join("aqua.db")).unwrap())
    }

    fn with_store(open: impl FnOnce(&TempDir) -> Store) -> Self {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().join("blobs")).unwrap();
        let store = open(&dir);
        Self {
            dir,
            store,
            blobs: FsBlobStore::new(root),
            config: EngineConfig::default(),
        }
    }

    pub fn database(&self) -> std::path::PathBuf {
        self.dir.path().join("aqua.db")
    }

    pub fn append(&mut self, who: &OwnerId, previous: Option<&PubkeyHash>, body: RevisionBody) -> PubkeyHash {
        self.store
            .append(&NewRevision::new(who.clone(), previous.cloned(), body))
            .unwrap()
    }

    pub fn file(&mut self, who: &OwnerId, name: &str, bytes: &[u8]) -> PubkeyHash {
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

    pub fn form(&mut self, previous: &PubkeyHash, value: &str) -> PubkeyHash {
        let who = previous.owner.clone();
        self.append(
            &who,
            Some(previous),
            RevisionBody::Form {
                fields: vec![FormField {
                    key: "forms_note".to_string(),
                    value: value.to_string(),
                    field_type: "string".to_string(),
                }],
                file: None,
            },
        )
    }

    pub fn link(&mut self, previous: &PubkeyHash, target: &str) -> PubkeyHash {
        let who = previous.owner.clone();
        self.append(
            &who,
            Some(previous),
            RevisionBody::Link(LinkRecord {
                link_type: "aqua".to_string(),
                verification_hashes: vec![target.to_string()],
                file_hashes: Vec::new(),
                reference_count: 1,
            }),
        )
    }

    pub fn witness(&mut self, previous: &PubkeyHash, merkle_root: &str) -> PubkeyHash {
        let who = previous.owner.clone();
        self.append(
            &who,
            Some(previous),
            RevisionBody::Witness(WitnessEvent {
                merkle_root: merkle_root.to_string(),
                timestamp: "1700000000".to_string(),
                network: "sepolia".to_string(),
                contract_address: "0xwitnesscontract".to_string(),
                transaction_hash: "0xtx".to_string(),
                sender_account_address: who.to_string(),
            }),
        )
    }

    /// Tree at `head` with linked chains, no file objects.
    pub fn tree(&self, head: &PubkeyHash) -> AquaTree {
        TreeFetcher::new(&self.store, &self.blobs, &self.config)
            .fetch_tree(
                head,
                FetchOptions {
                    include_linked_chains: true,
                    include_file_objects: false,
                },
            )
            .unwrap()
    }

    pub fn gc(&mut self) -> GcEngine<'_> {
        GcEngine::new(&mut self.store, &self.blobs)
    }

    pub fn merge(&mut self) -> MergeEngine<'_> {
        MergeEngine::new(&mut self.store)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
