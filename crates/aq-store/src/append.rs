//! Creating revisions together with their side records.

use aq_core::hash::{revision_hash, RevisionContent};
use aq_core::{
    ContentHash, FormField, LinkRecord, OwnerId, PubkeyHash, Revision, RevisionType,
    SignatureRecord, WitnessEvent,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::info;

use crate::{Reader, Store, StoreError, StoreTx};

/// A file a revision points at. The blob must already be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub file_hash: ContentHash,
    pub name: String,
    pub location: String,
    pub size: i64,
}

/// Type-specific payload of a new revision.
#[derive(Debug, Clone, PartialEq)]
pub enum RevisionBody {
    File(FileAttachment),
    Form {
        fields: Vec<FormField>,
        file: Option<FileAttachment>,
    },
    Signature(SignatureRecord),
    Witness(WitnessEvent),
    Link(LinkRecord),
}

impl RevisionBody {
    pub fn revision_type(&self) -> RevisionType {
        match self {
            RevisionBody::File(_) => RevisionType::File,
            RevisionBody::Form { .. } => RevisionType::Form,
            RevisionBody::Signature(_) => RevisionType::Signature,
            RevisionBody::Witness(_) => RevisionType::Witness,
            RevisionBody::Link(_) => RevisionType::Link,
        }
    }

    fn file(&self) -> Option<&FileAttachment> {
        match self {
            RevisionBody::File(file) => Some(file),
            RevisionBody::Form { file, .. } => file.as_ref(),
            _ => None,
        }
    }

    /// Fields the verification hash commits to.
    pub fn content(&self) -> BTreeMap<String, Value> {
        let mut content = Map::new();
        if let Some(file) = self.file() {
            content.insert("file_hash".into(), json!(file.file_hash.as_str()));
        }
        match self {
            RevisionBody::File(_) => {}
            RevisionBody::Form { fields, .. } => {
                for field in fields {
                    content.insert(field.key.clone(), json!(field.value));
                }
            }
            RevisionBody::Signature(sig) => {
                content.insert("signature".into(), json!(sig.digest));
                content.insert("signature_public_key".into(), json!(sig.public_key));
                content.insert("signature_wallet_address".into(), json!(sig.wallet_address));
                content.insert("signature_type".into(), json!(sig.signature_type));
            }
            RevisionBody::Witness(event) => {
                content.insert("witness_merkle_root".into(), json!(event.merkle_root));
                content.insert("witness_network".into(), json!(event.network));
                content.insert("witness_transaction_hash".into(), json!(event.transaction_hash));
            }
            RevisionBody::Link(link) => {
                content.insert("link_type".into(), json!(link.link_type));
                content.insert(
                    "link_verification_hashes".into(),
                    json!(link.verification_hashes),
                );
                content.insert("link_file_hashes".into(), json!(link.file_hashes));
            }
        }
        content.into_iter().collect()
    }
}

/// Input to [`Store::append`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewRevision {
    pub owner: OwnerId,
    /// Verification hash to store under; computed from the content when `None`.
    pub hash: Option<ContentHash>,
    pub previous: Option<PubkeyHash>,
    pub local_timestamp: String,
    pub verification_leaves: Vec<String>,
    pub body: RevisionBody,
}

impl NewRevision {
    pub fn new(owner: OwnerId, previous: Option<PubkeyHash>, body: RevisionBody) -> Self {
        Self {
            owner,
            hash: None,
            previous,
            local_timestamp: aq_core::aqua_timestamp(),
            verification_leaves: Vec::new(),
            body,
        }
    }

    pub fn with_timestamp(mut self, local_timestamp: impl Into<String>) -> Self {
        self.local_timestamp = local_timestamp.into();
        self
    }

    fn key(&self) -> Result<PubkeyHash, StoreError> {
        let hash = match &self.hash {
            Some(hash) => hash.clone(),
            None => {
                let content = self.body.content();
                let previous = self
                    .previous
                    .as_ref()
                    .map(PubkeyHash::hash_str)
                    .unwrap_or_default();
                ContentHash::new(revision_hash(&RevisionContent {
                    previous_verification_hash: previous,
                    revision_type: self.body.revision_type(),
                    local_timestamp: &self.local_timestamp,
                    content: &content,
                })?)?
            }
        };
        Ok(PubkeyHash::new(self.owner.clone(), hash))
    }
}

impl StoreTx<'_> {
    /// Insert one revision with its side record and move the owner's head.
    pub fn append(&self, new: &NewRevision) -> Result<PubkeyHash, StoreError> {
        let key = self.append_detached(new)?;
        self.move_latest(new.previous.as_ref(), &key)?;
        self.bump_owner_version(&new.owner)?;
        Ok(key)
    }

    /// Like [`append`](Self::append) but leaves Latest and the owner version alone.
    pub fn append_detached(&self, new: &NewRevision) -> Result<PubkeyHash, StoreError> {
        let key = new.key()?;
        if let Some(previous) = &new.previous {
            if self.revision(previous)?.is_none() {
                return Err(StoreError::UnknownRevision(previous.clone()));
            }
        }

        self.insert_revision(&Revision {
            key: key.clone(),
            revision_type: new.body.revision_type(),
            previous: new.previous.clone(),
            children: Vec::new(),
            local_timestamp: new.local_timestamp.clone(),
            has_content: new.body.file().is_some(),
            verification_leaves: new.verification_leaves.clone(),
            obsolete: false,
        })?;

        if let Some(file) = new.body.file() {
            self.register_file(&file.file_hash, &file.location, file.size)?;
            self.attach_file(&file.file_hash, &key)?;
            self.set_file_name(&key, &file.name)?;
        }
        match &new.body {
            RevisionBody::File(_) => {}
            RevisionBody::Form { fields, .. } => self.insert_forms(&key, fields)?,
            RevisionBody::Signature(sig) => self.insert_signature(&key, sig)?,
            RevisionBody::Witness(event) => {
                self.upsert_witness_event(event)?;
                self.insert_witness(&key, &event.merkle_root)?;
            }
            RevisionBody::Link(link) => self.insert_link(&key, link)?,
        }

        info!(
            action = "append",
            %key,
            revision_type = %new.body.revision_type(),
            "revision created"
        );
        Ok(key)
    }
}

impl Store {
    /// Append in its own transaction.
    pub fn append(&mut self, new: &NewRevision) -> Result<PubkeyHash, StoreError> {
        self.write(|tx| tx.append(new))
    }

    /// Tag the Latest entry at `key` with a template and workflow flag.
    pub fn tag_latest(
        &mut self,
        key: &PubkeyHash,
        template_id: Option<&str>,
        is_workflow: bool,
    ) -> Result<(), StoreError> {
        self.write(|tx| {
            if tx.latest(key)?.is_none() {
                return Err(StoreError::UnknownRevision(key.clone()));
            }
            tx.upsert_latest(&aq_core::LatestEntry {
                key: key.clone(),
                template_id: template_id.map(str::to_string),
                is_workflow,
            })?;
            tx.bump_owner_version(&key.owner)?;
            Ok(())
        })
    }
}
