//! JSON file storage.
//!
//! Each collection is one pretty-printed JSON array in the data directory.
//! Saves write a sibling temp file, fsync it and rename it over the target,
//! so readers see either the old or the new file. A missing file is an empty
//! collection.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::schema::Collection;
use crate::{ensure_unique_ids, CredentialStore, Document, StoreBackend};

/// File-backed credential store.
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of a collection's file.
    #[must_use]
    pub fn path_of(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }
}

impl CredentialStore for FileStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::File
    }

    fn load(&self, collection: Collection) -> Result<Vec<Document>> {
        let path = self.path_of(collection);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let bodies: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
        bodies
            .into_iter()
            .map(|body| Document::from_body(collection, body))
            .collect()
    }

    fn save(&self, collection: Collection, snapshot: &[Document]) -> Result<()> {
        ensure_unique_ids(collection, snapshot)?;

        let bodies: Vec<&serde_json::Value> = snapshot.iter().map(|d| &d.body).collect();
        let json = serde_json::to_vec_pretty(&bodies)?;

        let path = self.path_of(collection);
        let tmp = path.with_extension("json.tmp");

        let _guard = self.write_lock.lock();

        let written = (|| -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::Unavailable(format!(
                "failed to write {}: {e}",
                path.display()
            )));
        }

        tracing::debug!(
            collection = %collection,
            count = snapshot.len(),
            "Saved snapshot to file"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.load(Collection::ApiKeys).unwrap().is_empty());
    }

    #[test]
    fn writes_plain_json_array() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let doc = Document::from_body(Collection::Tokens, json!({ "token": "t1" })).unwrap();
        store.save(Collection::Tokens, &[doc]).unwrap();

        let raw = fs::read_to_string(dir.path().join("tokens.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, json!([{ "token": "t1" }]));
        assert!(!dir.path().join("tokens.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("api_keys.json"), "{not json").unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let err = store.load(Collection::ApiKeys).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
