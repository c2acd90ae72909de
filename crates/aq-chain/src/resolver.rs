//! Linked-chain expansion and the composed fetch.
//!
//! Link revisions point at a revision of another chain through the first
//! entry of `link_verification_hashes`. Expansion walks and assembles that
//! chain, then follows its own links, depth first, with an explicit stack.
//! A single visited set spans the whole expansion, so every revision is
//! assembled at most once and link cycles terminate.

use aq_core::{
    compound_key, hash_only, AquaTree, Cancellation, EngineConfig, FileContent, FileObject,
    KeyError, OwnerId, PubkeyHash, RevisionType, ERROR_MARKER,
};
use aq_store::{BlobStorage, Reader, StoreError};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::assembler::assemble;
use crate::materializer::FileMaterializer;
use crate::walker::{walk, walk_forward};
use crate::{ProvenanceError, Result};

/// What [`TreeFetcher::fetch_tree`] includes beyond the primary chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub include_linked_chains: bool,
    pub include_file_objects: bool,
}

impl FetchOptions {
    pub fn full() -> Self {
        Self {
            include_linked_chains: true,
            include_file_objects: true,
        }
    }
}

/// Key a link's raw verification hash resolves to.
///
/// Qualified values are taken as they are. Bare hashes of system templates
/// belong to the system owner; any other bare hash belongs to the owner of
/// the link revision.
pub fn link_target(
    config: &EngineConfig,
    link_owner: &OwnerId,
    raw: &str,
) -> std::result::Result<PubkeyHash, KeyError> {
    if raw.contains(aq_core::KEY_SEPARATOR) {
        return PubkeyHash::parse(raw);
    }
    if config.is_system_template(raw) {
        return PubkeyHash::parse_or_inherit(raw, &config.system_owner_id()?);
    }
    PubkeyHash::parse_or_inherit(raw, link_owner)
}

struct LoadedChain {
    tree: AquaTree,
    /// Qualified keys in tree order.
    keys: Vec<PubkeyHash>,
}

impl LoadedChain {
    /// `(link revision, raw target)` for every link in the chain.
    fn links(&self) -> Vec<(PubkeyHash, String)> {
        self.keys
            .iter()
            .filter_map(|key| {
                let payload = self.tree.revisions.get(key.hash_str())?;
                if payload.revision_type != RevisionType::Link {
                    return None;
                }
                let target = payload
                    .link_verification_hashes()
                    .into_iter()
                    .find(|hash| !hash.is_empty())?;
                Some((key.clone(), target))
            })
            .collect()
    }

    fn file_keys(&self) -> impl Iterator<Item = &PubkeyHash> {
        self.keys.iter().filter(|key| {
            self.tree
                .revisions
                .get(key.hash_str())
                .is_some_and(|payload| payload.fields.contains_key("file_hash"))
        })
    }
}

struct Job {
    parent: usize,
    link: PubkeyHash,
    raw_target: String,
    depth: usize,
}

enum Expansion {
    Tree(usize),
    Empty,
}

struct Edge {
    parent: usize,
    key: String,
    expansion: Expansion,
}

/// Fetches assembled trees: walk, assemble, expand links, list files.
pub struct TreeFetcher<'a, R: Reader + ?Sized> {
    reader: &'a R,
    blobs: &'a dyn BlobStorage,
    config: &'a EngineConfig,
    cancel: Cancellation,
}

impl<'a, R: Reader + ?Sized> TreeFetcher<'a, R> {
    pub fn new(reader: &'a R, blobs: &'a dyn BlobStorage, config: &'a EngineConfig) -> Self {
        Self {
            reader,
            blobs,
            config,
            cancel: Cancellation::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ProvenanceError::Cancelled);
        }
        Ok(())
    }

    fn load_chain(&self, head: &PubkeyHash) -> Result<LoadedChain> {
        let revisions = walk(self.reader, head)?;
        let by_hash: HashMap<String, PubkeyHash> = revisions
            .iter()
            .map(|rev| (rev.key.hash_str().to_string(), rev.key.clone()))
            .collect();
        let tree = assemble(self.reader, revisions)?;
        let keys = tree
            .revisions
            .keys()
            .filter_map(|hash| by_hash.get(hash).cloned())
            .collect();
        Ok(LoadedChain { tree, keys })
    }

    /// Tree of the chain ending at `head`.
    ///
    /// The primary chain must be intact. Linked chains that fail to resolve
    /// are recorded as [`ERROR_MARKER`] in the parent's file index.
    pub fn fetch_tree(&self, head: &PubkeyHash, options: FetchOptions) -> Result<AquaTree> {
        self.check_cancelled()?;
        let root = self.load_chain(head)?;
        let mut file_keys: Vec<PubkeyHash> = root.file_keys().cloned().collect();

        let mut tree = if options.include_linked_chains {
            self.expand(root, &mut file_keys)?
        } else {
            root.tree
        };

        if options.include_file_objects {
            self.check_cancelled()?;
            let mut objects = FileMaterializer::new(self.reader, self.blobs, &self.config.base_url)
                .materialize(&file_keys)?;
            let mut names: HashSet<String> =
                objects.iter().map(|object| object.file_name.clone()).collect();
            for bundle in self.tree_objects(&tree)? {
                if names.insert(bundle.file_name.clone()) {
                    objects.push(bundle);
                }
            }
            tree.file_objects = Some(objects);
        }

        info!(
            action = "fetch_tree",
            %head,
            revisions = tree.len(),
            linked = tree.linked_chains.as_ref().map_or(0, BTreeMap::len),
            "assembled tree"
        );
        Ok(tree)
    }

    /// Like [`fetch_tree`](Self::fetch_tree), starting from the newest
    /// descendant of `key`.
    pub fn fetch_latest_tree(&self, key: &PubkeyHash, options: FetchOptions) -> Result<AquaTree> {
        let head = walk_forward(self.reader, key)?;
        self.fetch_tree(&head, options)
    }

    fn expand(&self, root: LoadedChain, file_keys: &mut Vec<PubkeyHash>) -> Result<AquaTree> {
        let mut visited: HashSet<PubkeyHash> = root.keys.iter().cloned().collect();
        let mut stack: Vec<Job> = Vec::new();
        push_jobs(&mut stack, 0, &root, 1);
        let mut arena: Vec<Option<AquaTree>> = vec![Some(root.tree)];
        let mut edges: Vec<Edge> = Vec::new();

        while let Some(job) = stack.pop() {
            self.check_cancelled()?;
            let linked_hash = hash_only(&job.raw_target).to_string();
            let key = compound_key(job.link.hash_str(), &linked_hash);

            if job.depth > self.config.max_link_depth {
                warn!(link = %job.link, depth = job.depth, "link depth limit reached");
                continue;
            }

            let target = match link_target(self.config, &job.link.owner, &job.raw_target) {
                Ok(target) => target,
                Err(err) => {
                    warn!(link = %job.link, error = %err, "unresolvable link target");
                    mark_error(&mut arena, job.parent, linked_hash);
                    continue;
                }
            };

            if visited.contains(&target) {
                debug!(%target, "linked chain already visited");
                edges.push(Edge {
                    parent: job.parent,
                    key,
                    expansion: Expansion::Empty,
                });
                continue;
            }

            let chain = match self.load_chain(&target) {
                Ok(chain) => chain,
                Err(ProvenanceError::Cancelled) => return Err(ProvenanceError::Cancelled),
                Err(err) => {
                    warn!(link = %job.link, %target, error = %err, "linked chain failed to resolve");
                    mark_error(&mut arena, job.parent, linked_hash);
                    continue;
                }
            };

            visited.extend(chain.keys.iter().cloned());
            file_keys.extend(chain.file_keys().cloned());
            let genesis_name = chain
                .tree
                .genesis_hash()
                .and_then(|genesis| chain.tree.file_index.get(genesis))
                .cloned();
            if let Some(Some(parent)) = arena.get_mut(job.parent) {
                if let Some(name) = genesis_name {
                    parent.file_index.insert(linked_hash, name);
                }
            }

            let index = arena.len();
            push_jobs(&mut stack, index, &chain, job.depth + 1);
            arena.push(Some(chain.tree));
            edges.push(Edge {
                parent: job.parent,
                key,
                expansion: Expansion::Tree(index),
            });
        }

        // A child's own edges are always recorded after the edge to it.
        for edge in edges.into_iter().rev() {
            let subtree = match edge.expansion {
                Expansion::Tree(index) => arena
                    .get_mut(index)
                    .and_then(Option::take)
                    .unwrap_or_default(),
                Expansion::Empty => AquaTree::new(),
            };
            if let Some(Some(parent)) = arena.get_mut(edge.parent) {
                parent
                    .linked_chains
                    .get_or_insert_with(BTreeMap::new)
                    .insert(edge.key, subtree);
            }
        }

        Ok(arena
            .into_iter()
            .next()
            .flatten()
            .unwrap_or_default())
    }

    /// Bundles for `tree` and each expanded linked chain, root first.
    fn tree_objects(&self, tree: &AquaTree) -> Result<Vec<FileObject>> {
        let mut objects = Vec::new();
        let mut pending = vec![tree];
        while let Some(next) = pending.pop() {
            if next.is_empty() {
                continue;
            }
            objects.push(self.tree_object(next)?);
            if let Some(chains) = &next.linked_chains {
                pending.extend(chains.values().rev());
            }
        }
        Ok(objects)
    }

    /// The tree itself as `<genesis name>.aqua.json`.
    fn tree_object(&self, tree: &AquaTree) -> Result<FileObject> {
        let name = tree
            .genesis_hash()
            .map(|genesis| {
                tree.file_index
                    .get(genesis)
                    .cloned()
                    .unwrap_or_else(|| genesis.to_string())
            })
            .unwrap_or_else(|| ERROR_MARKER.to_string());
        let size = serde_json::to_vec(tree).map_err(StoreError::from)?.len() as i64;
        Ok(FileObject {
            file_name: format!("{name}.aqua.json"),
            file_content: FileContent::Tree(Box::new(tree.clone())),
            path: String::new(),
            file_size: size,
        })
    }
}

fn push_jobs(stack: &mut Vec<Job>, parent: usize, chain: &LoadedChain, depth: usize) {
    // Reversed so the first link is expanded first.
    for (link, raw_target) in chain.links().into_iter().rev() {
        stack.push(Job {
            parent,
            link,
            raw_target,
            depth,
        });
    }
}

fn mark_error(arena: &mut [Option<AquaTree>], parent: usize, linked_hash: String) {
    if let Some(Some(tree)) = arena.get_mut(parent) {
        tree.file_index.insert(linked_hash, ERROR_MARKER.to_string());
    }
}
