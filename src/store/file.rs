//! File-backed state store: one JSON file per key under a directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{is_valid_key, StateStore, StoreError, StoreResult};

const FILE_EXTENSION: &str = "json";

/// Store keeping each value in `{dir}/{key}.json`.
///
/// Writes go through a temp file and rename so a crash mid-write never leaves
/// a truncated value behind. There is no cross-process locking; concurrent
/// writers race on last-writer-wins, which is acceptable at the call volumes
/// this tool sees.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{FILE_EXTENSION}"))
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if !is_valid_key(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        if !is_valid_key(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.{FILE_EXTENSION}.tmp"));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        if !is_valid_key(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                debug!("skipping non-UTF8 file name in {}", self.dir.display());
                continue;
            };
            if let Some(stem) = name.strip_suffix(&format!(".{FILE_EXTENSION}")) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("usage_history", "[]").await.unwrap();
        assert_eq!(
            store.get("usage_history").await.unwrap(),
            Some("[]".to_string())
        );
        assert!(dir.path().join("usage_history.json").exists());
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert_eq!(store.get("nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_deleted_behind_our_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("k", "v").await.unwrap();
        std::fs::remove_file(dir.path().join("k.json")).unwrap();

        // A clean miss, never an error
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_keys_ignores_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("a", "1").await.unwrap();
        std::fs::write(dir.path().join("b.json.tmp"), "partial").unwrap();

        assert_eq!(store.list_keys().await.unwrap(), vec!["a"]);
    }
}
