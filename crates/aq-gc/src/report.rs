use aq_core::{ContentHash, OwnerId, PubkeyHash};
use serde::Serialize;
use std::collections::BTreeMap;

/// Storage released on behalf of one owner, for usage accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FreedUsage {
    pub files: u64,
    pub bytes: u64,
}

/// Side records released while deleting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReleasedRecords {
    pub signatures: usize,
    pub witnesses: usize,
    pub links: usize,
    pub forms: usize,
    pub file_names: usize,
}

/// What a delete did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    /// Deleted revisions, deepest first.
    pub deleted: Vec<PubkeyHash>,
    pub released: ReleasedRecords,
    pub witness_events_removed: usize,
    /// Files whose last reference went away. Their bytes are removed after commit.
    pub files_collected: Vec<ContentHash>,
    /// Collected files whose bytes could not be removed.
    pub blobs_left_behind: Vec<ContentHash>,
    /// Surviving revisions whose `previous` was cleared.
    pub previous_cleared: usize,
    pub latest_removed: usize,
    pub latest_repointed: usize,
    pub contracts_removed: usize,
    pub freed: BTreeMap<OwnerId, FreedUsage>,
}

impl DeleteReport {
    pub(crate) fn free(&mut self, owner: &OwnerId, bytes: i64) {
        let usage = self.freed.entry(owner.clone()).or_default();
        usage.files += 1;
        usage.bytes += bytes.max(0) as u64;
    }
}
