use std::path::Path;

use crate::cache::CacheBackend;
use crate::cache::CacheError;

const TREE_NAME: &str = "plaza-cache";

/// Embedded on-disk backend; survives process restarts so a cold launch can
/// serve yesterday's snapshots while offline.
pub struct SledBackend {
    tree: sled::Tree,
}

impl SledBackend {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let db = sled::Config::new().path(path).open()?;
        Ok(Self {
            tree: db.open_tree(TREE_NAME)?,
        })
    }

    /// Backed by a throwaway directory; for tests.
    pub fn temporary() -> Result<Self, CacheError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            tree: db.open_tree(TREE_NAME)?,
        })
    }
}

impl CacheBackend for SledBackend {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.tree.get(key)?.map(|value| value.to_vec()))
    }

    fn store(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut removed = 0u64;
        for item in self.tree.scan_prefix(prefix) {
            let (key, _) = item?;
            self.tree.remove(key)?;
            removed += 1;
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.tree.clear()?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        for item in self.tree.iter() {
            let (key, _) = item?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }

    fn len(&self) -> usize {
        self.tree.len()
    }
}
