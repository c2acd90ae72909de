//! Content-addressed blob storage for file bytes.

use aq_core::hash::content_hash;
use aq_core::ContentHash;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io::{self, Read};
use tracing::{debug, warn};

use crate::StoreError;

/// A blob written by [`BlobStorage::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub file_hash: ContentHash,
    /// Location relative to the storage root, as recorded on the file row.
    pub location: String,
    pub size: i64,
}

/// Physical storage behind `files.location`.
pub trait BlobStorage {
    fn resolve(&self, location: &str) -> Result<Utf8PathBuf, StoreError>;

    /// Size in bytes, or `None` when nothing is stored at `location`.
    fn size(&self, location: &str) -> Result<Option<u64>, StoreError>;

    fn open(&self, location: &str) -> Result<Box<dyn Read>, StoreError>;

    /// Store `bytes` under their content hash. Existing blobs are kept.
    fn put(&self, bytes: &[u8]) -> Result<StoredBlob, StoreError>;

    /// Returns `false` when nothing was stored at `location`.
    fn remove(&self, location: &str) -> Result<bool, StoreError>;
}

/// Blobs as plain files under one root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: Utf8PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

fn is_plain_location(location: &str) -> bool {
    let path = Utf8Path::new(location);
    !location.is_empty()
        && path.is_relative()
        && path
            .components()
            .all(|component| matches!(component, camino::Utf8Component::Normal(_)))
}

impl BlobStorage for FsBlobStore {
    fn resolve(&self, location: &str) -> Result<Utf8PathBuf, StoreError> {
        if !is_plain_location(location) {
            return Err(StoreError::Corrupt(format!(
                "blob location '{location}' escapes the storage root"
            )));
        }
        Ok(self.root.join(location))
    }

    fn size(&self, location: &str) -> Result<Option<u64>, StoreError> {
        match fs::metadata(self.resolve(location)?) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn open(&self, location: &str) -> Result<Box<dyn Read>, StoreError> {
        Ok(Box::new(File::open(self.resolve(location)?)?))
    }

    fn put(&self, bytes: &[u8]) -> Result<StoredBlob, StoreError> {
        let file_hash = ContentHash::new(content_hash(bytes))?;
        let location = file_hash.as_str().to_string();
        let path = self.resolve(&location)?;
        if !path.exists() {
            fs::create_dir_all(&self.root)?;
            fs::write(&path, bytes)?;
            debug!(%path, size = bytes.len(), "stored blob");
        }
        Ok(StoredBlob {
            file_hash,
            location,
            size: bytes.len() as i64,
        })
    }

    fn remove(&self, location: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.resolve(location)?) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(location, "blob already gone");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}
