use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::cache::CacheBackend;
use crate::cache::CacheError;

/// Single mutex over one map. Contention is low enough that per-entry locking
/// would buy nothing.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries().get(key).cloned())
    }

    fn store(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries().remove(key);
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries().clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.entries().keys().cloned().collect())
    }

    fn len(&self) -> usize {
        self.entries().len()
    }
}
