//! In-process store backed by a map.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use toolcache_common::{CacheKey, Timestamp};

use super::Store;
use crate::entry::{CacheEntry, EntryMeta};
use crate::error::CacheError;

/// A [`Store`] that lives only as long as the process.
///
/// Behaves like [`FileStore`](super::FileStore) apart from durability, which
/// makes it the backend of choice for exercising cache logic in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries held, expired or not.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave the map half-updated, so
    // poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &CacheKey, now: Timestamp) -> Option<CacheEntry> {
        let found = self.read().get(key).cloned()?;
        if found.is_expired(now) {
            self.write().remove(key);
            return None;
        }
        Some(found)
    }

    fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.write().insert(entry.key, entry.clone());
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.write().remove(key).is_some())
    }

    fn delete_where(&self, predicate: &dyn Fn(&EntryMeta) -> bool) -> Result<usize, CacheError> {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| !predicate(&entry.meta()));
        Ok(before - entries.len())
    }

    fn enumerate(&self) -> Box<dyn Iterator<Item = EntryMeta> + '_> {
        let snapshot: Vec<EntryMeta> = self.read().values().map(CacheEntry::meta).collect();
        Box::new(snapshot.into_iter())
    }

    fn keys(&self) -> Box<dyn Iterator<Item = CacheKey> + '_> {
        let snapshot: Vec<CacheKey> = self.read().keys().copied().collect();
        Box::new(snapshot.into_iter())
    }

    fn meta(&self, key: &CacheKey) -> Option<EntryMeta> {
        self.read().get(key).map(CacheEntry::meta)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
