//! Downloadable file objects for a set of revisions.

use aq_core::{FileContent, FileObject, PubkeyHash, ERROR_MARKER};
use aq_store::{BlobStorage, Reader};
use std::collections::HashSet;
use tracing::warn;

use crate::Result;

/// Resolves revision keys to [`FileObject`]s through the file tables and blob
/// storage.
pub struct FileMaterializer<'a, R: Reader + ?Sized> {
    reader: &'a R,
    blobs: &'a dyn BlobStorage,
    base_url: &'a str,
}

impl<'a, R: Reader + ?Sized> FileMaterializer<'a, R> {
    pub fn new(reader: &'a R, blobs: &'a dyn BlobStorage, base_url: &'a str) -> Self {
        Self {
            reader,
            blobs,
            base_url: base_url.trim_end_matches('/'),
        }
    }

    /// Public URL of a stored file.
    pub fn file_url(&self, file_hash: &str) -> String {
        format!("{}/files/{}", self.base_url, file_hash)
    }

    /// One object for `key`. Missing rows or bytes degrade to the error marker.
    pub fn file_object(&self, key: &PubkeyHash) -> Result<FileObject> {
        let Some(file_hash) = self.reader.indexed_file_hash(key)? else {
            warn!(%key, "revision is not in the file index");
            return Ok(error_object(0));
        };
        let Some(record) = self.reader.file(&file_hash)? else {
            warn!(%key, %file_hash, "file row missing");
            return Ok(error_object(0));
        };

        let mut name = self.reader.file_name(key)?;
        if name.is_none() {
            warn!(%key, "file name missing");
        }
        let size = match self.blobs.size(&record.location) {
            Ok(Some(size)) => size as i64,
            Ok(None) => {
                warn!(%key, location = %record.location, "file bytes missing");
                name = None;
                record.size
            }
            Err(err) => {
                warn!(%key, error = %err, "could not stat file bytes");
                record.size
            }
        };

        let path = match self.blobs.resolve(&record.location) {
            Ok(path) => path.into_string(),
            Err(err) => {
                warn!(%key, error = %err, "could not resolve file location");
                record.location.clone()
            }
        };

        Ok(FileObject {
            file_name: name.unwrap_or_else(|| ERROR_MARKER.to_string()),
            file_content: FileContent::Url(self.file_url(file_hash.as_str())),
            path,
            file_size: size,
        })
    }

    /// Objects for `keys`, first occurrence of each name kept.
    pub fn materialize<'k, I>(&self, keys: I) -> Result<Vec<FileObject>>
    where
        I: IntoIterator<Item = &'k PubkeyHash>,
    {
        let mut names: HashSet<String> = HashSet::new();
        let mut objects = Vec::new();
        for key in keys {
            let object = self.file_object(key)?;
            if names.insert(object.file_name.clone()) {
                objects.push(object);
            }
        }
        Ok(objects)
    }
}

fn error_object(file_size: i64) -> FileObject {
    FileObject {
        file_name: ERROR_MARKER.to_string(),
        file_content: FileContent::Url(ERROR_MARKER.to_string()),
        path: String::new(),
        file_size,
    }
}

/// Shorthand for [`FileMaterializer::materialize`].
pub fn materialize<'k, R, I>(
    reader: &R,
    blobs: &dyn BlobStorage,
    base_url: &str,
    keys: I,
) -> Result<Vec<FileObject>>
where
    R: Reader + ?Sized,
    I: IntoIterator<Item = &'k PubkeyHash>,
{
    FileMaterializer::new(reader, blobs, base_url).materialize(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_core::OwnerId;
    use aq_store::{FileAttachment, FsBlobStore, NewRevision, RevisionBody, Store};
    use camino::Utf8PathBuf;

    fn setup() -> (tempfile::TempDir, Store, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, Store::open_in_memory().unwrap(), FsBlobStore::new(root))
    }

    fn add_file(store: &mut Store, blobs: &FsBlobStore, owner: &str, name: &str, bytes: &[u8]) -> PubkeyHash {
        let blob = blobs.put(bytes).unwrap();
        store
            .append(&NewRevision::new(
                OwnerId::new(owner).unwrap(),
                None,
                RevisionBody::File(FileAttachment {
                    file_hash: blob.file_hash,
                    name: name.to_string(),
                    location: blob.location,
                    size: blob.size,
                }),
            ))
            .unwrap()
    }

    #[test]
    fn test_materialize_urls_and_sizes() {
        let (_dir, mut store, blobs) = setup();
        let key = add_file(&mut store, &blobs, "0xalice", "doc.txt", b"twelve bytes");
        let objects = materialize(&store, &blobs, "http://host/", [&key]).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].file_name, "doc.txt");
        assert_eq!(objects[0].file_size, 12);
        let file_hash = store.indexed_file_hash(&key).unwrap().unwrap();
        assert_eq!(
            objects[0].file_content,
            FileContent::Url(format!("http://host/files/{file_hash}"))
        );
        let location = store.file(&file_hash).unwrap().unwrap().location;
        let path = blobs.resolve(&location).unwrap();
        assert_eq!(objects[0].path, path.as_str());
        assert!(std::path::Path::new(&objects[0].path).is_file());
    }

    #[test]
    fn test_missing_bytes_degrade_to_marker() {
        let (_dir, mut store, blobs) = setup();
        let good = add_file(&mut store, &blobs, "0xalice", "good.txt", b"good");
        let bad = add_file(&mut store, &blobs, "0xbob", "bad.txt", b"bad");
        let location = store
            .file(&store.indexed_file_hash(&bad).unwrap().unwrap())
            .unwrap()
            .unwrap()
            .location;
        blobs.remove(&location).unwrap();

        let objects = materialize(&store, &blobs, "http://host", [&bad, &good]).unwrap();
        let names: Vec<&str> = objects.iter().map(|o| o.file_name.as_str()).collect();
        assert_eq!(names, vec![ERROR_MARKER, "good.txt"]);
        assert_eq!(objects[0].file_size, 3);
    }

    #[test]
    fn test_dedup_by_name() {
        let (_dir, mut store, blobs) = setup();
        let a = add_file(&mut store, &blobs, "0xalice", "same.txt", b"one");
        let b = add_file(&mut store, &blobs, "0xbob", "same.txt", b"two");
        let objects = materialize(&store, &blobs, "http://host", [&a, &b]).unwrap();
        assert_eq!(objects.len(), 1);
    }
}
